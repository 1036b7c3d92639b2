use anyhow::Result;

fn main() -> Result<()> {
    uploadbench::cli::execute()
}
