use std::io::Write;

/// 初始化全局 logger
///
/// 默认等级为 Info，可以通过 `RUST_LOG` 环境变量覆盖。
/// 重复调用是安全的，只有第一次生效。
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

pub fn init_log_with_level(default_level: log::LevelFilter) {
    let result = env_logger::Builder::new()
        .format(|buf, record| {
            let level_style = match record.level() {
                log::Level::Info => buf
                    .default_level_style(log::Level::Info)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
                log::Level::Warn => buf
                    .default_level_style(log::Level::Warn)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
                log::Level::Error => buf
                    .default_level_style(log::Level::Error)
                    .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
                level => buf.default_level_style(level),
            };
            let location_style =
                anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let line = record.line().unwrap_or(0);
            let time = chrono::Local::now().format("%Y/%m/%d %H:%M:%S%.3f");
            let thread = std::thread::current();
            let thread_name = thread.name().unwrap_or("unnamed");

            writeln!(
                buf,
                "{level_style}[{time}] {} [{thread_name}]: {}{level_style:#}\n\t {location_style}{} {file}:{line}{location_style:#}",
                record.level(),
                record.args(),
                record.module_path().unwrap_or(""),
            )
        })
        .filter(None, default_level)
        .parse_default_env()
        .try_init();

    if result.is_err() {
        log::debug!("logger already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_log_twice() {
        init_log();
        init_log_with_level(log::LevelFilter::Debug);
        log::info!("logger works");
    }
}
