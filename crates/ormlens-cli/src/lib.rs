mod analyze;
mod cli;
mod config;
mod normalize;

pub fn run(args: Vec<String>) -> anyhow::Result<()> {
    let cmd = cli::parse_args(&args)?;
    match cmd {
        cli::Command::Help(topic) => {
            cli::print_help(topic);
            Ok(())
        }
        cli::Command::Analyze(args) => analyze::run(args),
        cli::Command::Normalize(args) => normalize::run(args),
    }
}
