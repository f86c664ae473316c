use anyhow::Result;

fn main() -> Result<()> {
    boltbench_server::cli::execute()
}
