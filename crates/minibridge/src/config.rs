use core::time::Duration;

/// Tuning for [`WorkerPoolEngine`](crate::WorkerPoolEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of worker threads. Each owns its own job queue.
    pub num_workers: usize,

    /// Capacity of each worker's job queue. Submissions beyond it are rejected
    /// with [`EngineError::QueueFull`](crate::EngineError::QueueFull) rather
    /// than blocking the caller.
    pub queue_depth: usize,

    /// How long `wait_stopped` waits for each worker to acknowledge exit.
    pub shutdown_timeout: Duration,
}

impl EngineConfig {
    /// Checks that the configuration can produce a working pool.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_workers == 0 {
            return Err("num_workers must be greater than 0".to_string());
        }
        if self.queue_depth == 0 {
            return Err("queue_depth must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            num_workers: std::thread::available_parallelism().map_or(1, usize::from),
            queue_depth: 1024,
            shutdown_timeout: Duration::from_secs(3),
        }
    }
}

/// Tuning for [`ServiceClient`](crate::ServiceClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline applied by `minify`. `None` waits until the request resolves,
    /// which is bounded by `stop_service`.
    pub request_timeout: Option<Duration>,

    /// Number of protocol faults retained for slow fault subscribers.
    pub fault_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            fault_capacity: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_engine_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_empty_pool() {
        let config = EngineConfig {
            num_workers: 0,
            ..EngineConfig::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            "num_workers must be greater than 0"
        );
    }

    #[test]
    fn rejects_zero_queue() {
        let config = EngineConfig {
            queue_depth: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
