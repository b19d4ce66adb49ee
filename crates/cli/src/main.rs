use std::process::ExitCode;

fn main() -> ExitCode {
    booker_cli::run()
}
