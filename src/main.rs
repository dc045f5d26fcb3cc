use std::process::ExitCode;

fn main() -> ExitCode {
    ide_supervisor_lib::run()
}
