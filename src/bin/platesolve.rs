use anyhow::Result;

fn main() -> Result<()> {
    platesolve::cli::run()
}
