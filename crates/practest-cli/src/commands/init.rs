//! The `practest init` command.

use anyhow::Result;

pub fn execute() -> Result<()> {
    if std::path::Path::new("practest.toml").exists() {
        println!("practest.toml already exists, skipping.");
    } else {
        std::fs::write("practest.toml", SAMPLE_CONFIG)?;
        println!("Created practest.toml");
    }

    println!("\nNext steps:");
    println!("  1. Set PRACTEST_TOKEN or edit the [api] section of practest.toml");
    println!("  2. Run: practest writing --essay essay.txt");
    println!("  3. Run: practest speaking --audio answer.webm");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# practest configuration

# Upper bound on one submission or upload, in seconds
submit_timeout_secs = 90

[api]
base_url = "http://localhost:8000/api"
token = "${PRACTEST_TOKEN}"
# token_file = "~/.config/practest/token"
request_timeout_secs = 60

[writing]
duration_secs = 3600
min_words = 250

[speaking]
prep_secs = 60
speak_secs = 120
"#;
