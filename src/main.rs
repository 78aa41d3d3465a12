use clap::Parser;
use debcompare::ui::cli::Args;
use std::process::ExitCode;

fn setup_logging(level: log::LevelFilter) {
    env_logger::Builder::new()
        .filter(None, level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logging(args.log_level());

    let config = args.config();
    let request = args.request();
    let mut stdout = std::io::stdout().lock();

    match debcompare::run(&config, &request, args.format, !args.no_color, &mut stdout) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            let mut source = std::error::Error::source(&e);
            while let Some(s) = source {
                log::error!("  Caused by: {}", s);
                source = std::error::Error::source(s);
            }
            ExitCode::from(e.exit_code())
        }
    }
}
