#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not.
    if let Ok(cfg) = toml::from_str::<mixer_config::Config>(data) {
        let _ = cfg.validate();
        let _ = mixer_core::ExecutionLimits::from(&cfg.execution);
    }
});
