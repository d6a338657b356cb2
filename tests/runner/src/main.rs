use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    subgroup_cts_runner::run()
}
