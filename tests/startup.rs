use std::fs;
use std::process::Command;

#[test]
fn dotenv_log_settings_apply_before_config_validation() {
    let dir = tempfile::tempdir().expect("temp dir");
    let log_file = dir.path().join("from-dotenv.log");
    let path = log_file.display();
    let dotenv = format!("RUST_LOG=debug\nRECAPNOTE_LOG_FILE={path}\n");
    fs::write(dir.path().join(".env"), dotenv).expect("write .env");

    let output = Command::new(env!("CARGO_BIN_EXE_recapnote"))
        .current_dir(dir.path())
        .env_clear()
        .output()
        .expect("run server binary");

    assert!(!output.status.success(), "missing API keys must fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load configuration"), "{stderr}");
    assert!(log_file.exists(), "log file from .env was not opened");
    assert!(!dir.path().join("logs").exists());
}
