use clap::Parser;
use pdf_conform::{Severity, Validator, ValidatorConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "pdf-conform")]
#[command(about = "Check PDF files for well-formedness, validity and conformance profiles", long_about = None)]
struct Cli {
    /// PDF file to validate
    file: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Leave fonts out of the report
    #[arg(long)]
    no_fonts: bool,

    /// Stop listing fonts after this many
    #[arg(long, value_name = "N", default_value_t = 1000)]
    max_fonts: usize,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, value_name = "L", default_value = "warn")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    let config = ValidatorConfig::default()
        .with_show_fonts(!cli.no_fonts)
        .with_max_fonts(cli.max_fonts);

    let report = match Validator::new(config).validate_file(&cli.file) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", cli.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: cannot serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("File: {}", cli.file.display());
        print!("{}", report);
        let malformed = report.messages_with(Severity::Malformed).count();
        let invalid = report.messages_with(Severity::Invalid).count();
        if malformed + invalid > 0 {
            println!("{} malformed, {} invalid", malformed, invalid);
        }
    }

    if report.is_well_formed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
