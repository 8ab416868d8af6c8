use bwk_cli::{inner_main, Cli};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let value = match inner_main(args) {
        Ok(value) => value,
        Err(e) => {
            if let Some(e) = e.downcast_ref::<bwk_wallet::Error>() {
                serde_json::json!({ "error": e.to_string() })
            } else {
                return Err(e);
            }
        }
    };
    println!("{value:#}");
    Ok(())
}
