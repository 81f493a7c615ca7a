// ============================================================================
// ENGINE ERRORS
// ============================================================================

use crate::canvas::LayerId;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Context acquisition or canvas setup failed. Fatal.
    #[error("engine initialisation failed: {0}")]
    Init(String),

    /// One of the two programs failed to compile. Fatal.
    #[error("shader compilation failed for {program}: {message}")]
    ShaderCompile { program: String, message: String },

    /// Texture, framebuffer or readback-buffer allocation failed.
    #[error("allocation failed: {0}")]
    Allocation(String),

    #[error("framebuffer incomplete: {0}")]
    FramebufferIncomplete(String),

    #[error("layer {0} has GPU-side changes that were never synced to its CPU buffer")]
    StaleCpuBuffer(LayerId),

    #[error("drawing is disabled: {0}")]
    Disabled(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }

    pub fn shader(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ShaderCompile {
            program: program.into(),
            message: message.into(),
        }
    }

    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    pub fn framebuffer(msg: impl Into<String>) -> Self {
        Self::FramebufferIncomplete(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Allocation-class failures: the current operation is skipped but the
    /// engine stays usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Allocation(_) | Self::FramebufferIncomplete(_))
    }

    /// Errors that make the engine unusable from construction onwards.
    pub fn is_init_failure(&self) -> bool {
        matches!(self, Self::Init(_) | Self::ShaderCompile { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(EngineError::init("x").to_string().contains("initialisation failed"));
        assert!(EngineError::allocation("x").to_string().contains("allocation failed"));
        assert!(
            EngineError::shader("brush", "bad token")
                .to_string()
                .contains("brush: bad token")
        );
    }

    #[test]
    fn classification() {
        assert!(EngineError::allocation("oom").is_recoverable());
        assert!(EngineError::framebuffer("status").is_recoverable());
        assert!(!EngineError::init("no adapter").is_recoverable());
        assert!(EngineError::shader("compositor", "x").is_init_failure());
        assert!(!EngineError::config("x").is_init_failure());
    }
}
