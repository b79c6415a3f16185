#[cfg(feature = "env")]
use std::io::Write;

#[cfg(feature = "env")]
fn builder(default_filter: &str) -> env_logger::Builder {
    let env = env_logger::Env::default().default_filter_or(default_filter);
    let mut builder = env_logger::Builder::from_env(env);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} [{}] {}:{} - {}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.level(),
            std::thread::current().name().unwrap_or("-"),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    });
    builder
}

/// Install a test logger. Repeated calls, one per test, are harmless.
#[cfg(feature = "env")]
pub fn try_init_log() {
    let _ = builder("debug").is_test(true).try_init();
}

/// Install the console logger used when no log4rs configuration file is supplied.
///
/// `RUST_LOG` overrides `default_filter`.
#[cfg(feature = "env")]
pub fn init_console_log(default_filter: &str) -> Result<(), log::SetLoggerError> {
    builder(default_filter).try_init()
}
