use super::args::Cli;

pub mod analyze;
pub mod report;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    analyze::run(cli)
}
