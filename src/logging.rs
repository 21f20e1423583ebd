//! Logging helpers.

/// Route `log` output to stderr.
///
/// If called multiple times in the same process, only the first call applies, so tests may all call it.
pub fn log_to_stderr() {
    static ONCE: std::sync::Once = std::sync::Once::new();

    ONCE.call_once(|| {
        env_logger::builder()
            .format(|buf, record| {
                use std::io::Write;

                writeln!(
                    buf,
                    "{} {} time={} target={}",
                    record.level(),
                    record.args(),
                    time::OffsetDateTime::now_utc(),
                    record.target()
                )
            })
            .init();
    });
}
