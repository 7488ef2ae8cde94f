use chrono::Local;
use env_logger::fmt::{Color, Style, StyledValue};
use env_logger::Builder;
use log::{Level, LevelFilter, SetLoggerError};

const LOG_ENV: &str = "VIDSRC_LOG";

pub(crate) fn init_logger(debug: bool) -> Result<(), SetLoggerError> {
    formatted_local_time_builder("%H:%M:%S.%3f")
        .filter_level(if debug { LevelFilter::Trace } else { LevelFilter::Info })
        .parse_env(LOG_ENV)
        .try_init()
}

fn formatted_local_time_builder(fmt: &'static str) -> Builder {
    let mut builder = Builder::new();

    builder.format(|f, record| {
        use std::io::Write;

        if !is_own_target(record.target()) {
            return Ok(());
        }

        let mut style = f.style();
        let level = colored_level(&mut style, record.level());
        let time = Local::now().format(fmt);

        writeln!(f, "{} {} > {}", time, level, record.args())
    });

    builder
}

/// Dependencies log a lot on trace, only our own records are shown.
fn is_own_target(target: &str) -> bool {
    let crate_target = clap::crate_name!();

    target == crate_target
        || target
            .strip_prefix(crate_target)
            .is_some_and(|rest| rest.starts_with("::"))
}

fn colored_level(style: &'_ mut Style, level: Level) -> StyledValue<'_, &'static str> {
    match level {
        Level::Trace => style.set_color(Color::Magenta).value("TRACE"),
        Level::Debug => style.set_color(Color::Blue).value("DEBUG"),
        Level::Info => style.set_color(Color::Green).value("INFO "),
        Level::Warn => style.set_color(Color::Yellow).value("WARN "),
        Level::Error => style.set_color(Color::Red).value("ERROR"),
    }
}
