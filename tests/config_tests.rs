#[cfg(test)]
mod tests {
    use latchpool::{
        config::{self, Config, AWAIT_TIMEOUT, DEFAULT_GLOBAL_THREADS, GLOBAL_THREADS_ENV},
    };
    use std::{env, time::Duration};

    // Environment access is process-wide, so every case lives in one test.
    #[test]
    fn test_config_from_env() {
        println!("\n=== TEST: Configuration ===");

        env::remove_var(GLOBAL_THREADS_ENV);
        let config = Config::from_env().unwrap();
        assert_eq!(config.global_threads, DEFAULT_GLOBAL_THREADS);
        assert_eq!(config.default_concurrency, num_cpus::get() * 2);
        assert_eq!(config.await_timeout, AWAIT_TIMEOUT);
        assert!(config.await_timeout > Duration::from_secs(365 * 24 * 60 * 60));

        assert_eq!(config::current().global_threads, DEFAULT_GLOBAL_THREADS);

        env::set_var(GLOBAL_THREADS_ENV, " 4 ");
        assert_eq!(Config::from_env().unwrap().global_threads, 4);
        // The shared config is read once.
        assert_eq!(config::current().global_threads, DEFAULT_GLOBAL_THREADS);

        env::set_var(GLOBAL_THREADS_ENV, "0");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains(GLOBAL_THREADS_ENV));

        env::set_var(GLOBAL_THREADS_ENV, "many");
        assert!(Config::from_env().is_err());
        assert_eq!(Config::from_env_or_default().global_threads, DEFAULT_GLOBAL_THREADS);

        env::remove_var(GLOBAL_THREADS_ENV);
        assert_eq!(config::default_concurrency(), num_cpus::get() * 2);
        println!("  ✓ Environment parsed with fallbacks");
    }
}
