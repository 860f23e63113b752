use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::process::Command;

/// Provisions a worker on this machine over SSH, which requires
/// key-based SSH access to `localhost`.
#[test]
#[ignore]
fn test_primes_on_localhost() -> Result<(), Box<dyn std::error::Error>> {
    let root = std::env::temp_dir().join(format!("drover-e2e-{}", std::process::id()));
    let bin = root.join("bin");
    std::fs::create_dir_all(&bin)?;
    let script = bin.join("worker.sh");
    std::fs::write(
        &script,
        format!(
            "#!/bin/sh\nexec {} worker \"$@\"\n",
            PathBuf::from(env!("CARGO_BIN_EXE_drover")).display()
        ),
    )?;
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

    let output = Command::new(env!("CARGO_BIN_EXE_drover"))
        .args(["primes", "100", "-H", "localhost", "-r", "bin/worker.sh", "-d"])
        .arg(&bin)
        .output()?;
    std::fs::remove_dir_all(&root)?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "{stderr}");
    assert!(stderr.contains("25 primes found"), "{stderr}");
    Ok(())
}
