//! xml-splice CLI: drop a subtree from a large xml document and splice in a replacement.

use clap::Parser;
use std::path::PathBuf;
use std::process;
use xml_splice::{splice_files, Error, SpliceOptions};

#[derive(Parser)]
#[command(
    name = "xml-splice",
    version,
    about = "Stream an xml document, remove a subtree of the target element and splice in a replacement",
    long_about = "Streams INPUT to OUTPUT. Inside the element whose identifying attribute equals\n\
the target id, every candidate subtree whose name is the removed name is dropped.\n\
After the target closes, a new element with the new id is written, holding the\n\
flattened children of the replacement document.\n\
\n\
Example:\n  \
xml-splice --target-id E --remove-name Catalonia --new-id CAT \\\n    \
--replacement catdata.xml mondial.xml mondial_updated.xml"
)]
struct Cli {
    /// Source document
    input: PathBuf,

    /// Where the rewritten document is written
    output: PathBuf,

    /// Small document whose flattened children are spliced in
    #[arg(short, long)]
    replacement: PathBuf,

    /// TOML file with the run options
    #[arg(short, long, env = "XML_SPLICE_CONFIG")]
    config: Option<PathBuf>,

    /// Identifying attribute value of the target element
    #[arg(long)]
    target_id: Option<String>,

    /// Candidates whose name element holds this text are removed
    #[arg(long)]
    remove_name: Option<String>,

    /// Identifying attribute value of the spliced element
    #[arg(long)]
    new_id: Option<String>,

    /// Start the output with an xml declaration
    #[arg(long)]
    declaration: bool,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = match verbose {
        0 => "xml_splice=info",
        1 => "xml_splice=debug",
        _ => "xml_splice=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn options(cli: &Cli) -> Result<SpliceOptions, Error> {
    let mut options = match &cli.config {
        Some(path) => SpliceOptions::from_file(path)?,
        None => {
            let missing =
                |flag: &str| Error::Config(format!("--{} is required without --config", flag));
            SpliceOptions::new(
                cli.target_id.clone().ok_or_else(|| missing("target-id"))?,
                cli.remove_name.clone().ok_or_else(|| missing("remove-name"))?,
                cli.new_id.clone().ok_or_else(|| missing("new-id"))?,
            )
        }
    };
    if let Some(target_id) = &cli.target_id {
        options.target_id = target_id.clone();
    }
    if let Some(remove_name) = &cli.remove_name {
        options.remove_name = remove_name.clone();
    }
    if let Some(new_id) = &cli.new_id {
        options.new_id = new_id.clone();
    }
    if cli.declaration {
        options.write_declaration = true;
    }
    options.validate()?;
    Ok(options)
}

fn run(cli: &Cli) -> Result<(), Error> {
    let options = options(cli)?;
    let report = splice_files(&cli.input, &cli.replacement, &cli.output, &options)?;
    if !report.target_found {
        eprintln!(
            "warning: no <{} {}=\"{}\"> in {}, output is unchanged",
            options.target_element,
            options.id_attribute,
            options.target_id,
            cli.input.display()
        );
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
