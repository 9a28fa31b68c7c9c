//! Configuration types.

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Name used for the loop thread and in log events.
    pub name: String,
    /// Opaque capability tag for the owning pool. Never read by the worker.
    pub type_tag: Vec<u8>,
    /// Stack size for the loop thread (`None` = platform default).
    pub stack_size: Option<usize>,
}

impl WorkerConfig {
    /// Create a config with the given worker name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the type tag.
    pub fn with_type_tag(mut self, tag: impl Into<Vec<u8>>) -> Self {
        self.type_tag = tag.into();
        self
    }

    /// Set the loop thread's stack size.
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "slave-worker".to_string(),
            type_tag: Vec::new(),
            stack_size: None,
        }
    }
}
