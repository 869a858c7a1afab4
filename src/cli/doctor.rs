// src/cli/doctor.rs — `surfwatch doctor`: installation and config checks

use crate::infra::config::Config;
use crate::infra::paths;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl Check {
    fn new(name: &str, ok: bool, detail: String) -> Self {
        Self {
            name: name.to_string(),
            ok,
            detail,
        }
    }
}

fn program_check(name: &str, program: &str) -> Check {
    match which::which(program) {
        Ok(path) => Check::new(name, true, path.display().to_string()),
        Err(_) => Check::new(name, false, format!("'{program}' not found in PATH")),
    }
}

/// Every check `doctor` reports, in display order.
pub fn run_checks(config: &Config) -> Vec<Check> {
    let validation = match config.validate() {
        Ok(()) => Check::new(
            "config",
            true,
            format!("{} source(s)", config.sources.len()),
        ),
        Err(e) => Check::new("config", false, e.to_string()),
    };

    vec![
        validation,
        program_check("transcoder", &config.transcode.program),
        program_check("detector", &config.detector.command),
    ]
}

pub fn run_doctor(config: &Config) -> anyhow::Result<()> {
    println!("surfwatch doctor v{}", env!("CARGO_PKG_VERSION"));
    println!("  config file: {}", paths::config_file_path().display());
    println!();

    let checks = run_checks(config);
    for check in &checks {
        let mark = if check.ok { "ok" } else { "FAIL" };
        println!("  {:<12} {:<5} {}", check.name, mark, check.detail);
    }

    let failed = checks.iter().filter(|c| !c.ok).count();
    println!();
    if failed == 0 {
        println!("All checks passed.");
    } else {
        println!("{failed} check(s) failed.");
    }
    Ok(())
}
