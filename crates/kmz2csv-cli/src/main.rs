//! kmz2csv CLI - KML/KMZ to CSV converter
//!
//! Flattens placemark points, lines, and polygons into one CSV row per vertex.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use kmz2csv::{extract_placemarks, Converter, Document, GeometryRecord, Source};

mod config;
mod save;

use config::Config;
use save::{ConsoleStatus, DirectorySink};

#[derive(Parser)]
#[command(name = "kmz2csv")]
#[command(about = "Convert KML/KMZ placemarks to CSV", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert .kml/.kmz files to .csv
    Convert(ConvertArgs),
    /// Print the records extracted from a .kml/.kmz file
    Inspect {
        /// Input .kml or .kmz file
        input: PathBuf,
        /// Emit records as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct ConvertArgs {
    /// Input .kml or .kmz files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Directory for CSV output (default: next to each input)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Overwrite existing CSV files
    #[arg(short, long, overrides_with = "no_force")]
    force: bool,
    /// Never overwrite, even if the config file allows it
    #[arg(long, overrides_with = "force")]
    no_force: bool,
    /// Only print final status lines
    #[arg(short, long)]
    quiet: bool,
    /// Config file (default: ./kmz2csv.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

impl ConvertArgs {
    /// `--force` / `--no-force` beat the config file.
    fn overwrite(&self, config: &Config) -> bool {
        if self.force {
            true
        } else if self.no_force {
            false
        } else {
            config.overwrite()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Convert(args) => convert_files(&args),
        Commands::Inspect { input, json } => inspect_file(&input, json),
    }
}

fn init_tracing(verbose: u8) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();
}

/// `RUST_LOG` wins unless `-v` was given; without either, warnings only.
fn log_filter(verbose: u8, rust_log: Option<&str>) -> EnvFilter {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    match rust_log.filter(|spec| !spec.trim().is_empty()) {
        Some(spec) if verbose == 0 => EnvFilter::new(spec),
        Some(spec) => EnvFilter::new(spec).add_directive(level.into()),
        None => EnvFilter::default().add_directive(level.into()),
    }
}

fn convert_files(args: &ConvertArgs) -> Result<()> {
    let config = Config::load(args.config.as_deref())?;
    let output_dir = args.output_dir.clone().or_else(|| config.output_dir());
    let overwrite = args.overwrite(&config);

    let mut converter = Converter::new();
    let mut status = ConsoleStatus::new(args.quiet);
    let mut failed = 0usize;

    for input in &args.inputs {
        let result = convert_one(
            &mut converter,
            &mut status,
            input,
            output_dir.as_deref(),
            overwrite,
        );
        if let Err(err) = result {
            tracing::error!(input = %input.display(), "{err:#}");
            failed += 1;
        }
    }

    if failed > 0 {
        anyhow::bail!("{} of {} conversions failed", failed, args.inputs.len());
    }
    Ok(())
}

fn convert_one(
    converter: &mut Converter,
    status: &mut ConsoleStatus,
    input: &Path,
    output_dir: Option<&Path>,
    overwrite: bool,
) -> Result<()> {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    converter.select(&name, status)?;

    let source = Source::from_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let mut sink = DirectorySink::for_input(input, output_dir, overwrite);
    converter.convert(&source, status, &mut sink)?;

    for path in sink.written() {
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn inspect_file(input: &Path, json: bool) -> Result<()> {
    let source = Source::from_path(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let text = source.kml_text()?;
    let doc = Document::parse(&text)?;
    let records = extract_placemarks(&doc)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("{}: {} records", source.name(), records.len());
    println!("{:>6}  {:<8} {:>8}  Name", "Group", "Type", "Vertices");
    for group in summarize(&records) {
        println!(
            "{:>6}  {:<8} {:>8}  {}",
            group.group_id, group.kind, group.vertices, group.name
        );
    }
    Ok(())
}

/// One line of the `inspect` table.
struct GroupSummary<'a> {
    group_id: u64,
    kind: &'a str,
    vertices: usize,
    name: &'a str,
}

/// Collapse consecutive records sharing a group id.
fn summarize(records: &[GeometryRecord]) -> Vec<GroupSummary<'_>> {
    let mut groups: Vec<GroupSummary<'_>> = Vec::new();
    for record in records {
        match groups.last_mut() {
            Some(last) if last.group_id == record.group_id => last.vertices += 1,
            _ => groups.push(GroupSummary {
                group_id: record.group_id,
                kind: record.kind.as_str(),
                vertices: 1,
                name: &record.name,
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const KML: &str = r#"<kml><Document>
        <Placemark><name>Gate</name><Point><coordinates>1,2</coordinates></Point></Placemark>
        <Placemark><name>Fence</name>
          <LineString><coordinates>1,2 3,4 5,6</coordinates></LineString>
        </Placemark>
    </Document></kml>"#;

    fn write_kmz(path: &Path) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("doc.kml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(KML.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::parse_from(["kmz2csv", "-vv", "convert", "a.kml", "b.kmz", "-o", "out"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Convert(args) => {
                assert_eq!(args.inputs.len(), 2);
                assert_eq!(args.output_dir, Some(PathBuf::from("out")));
                assert!(!args.force);
            }
            Commands::Inspect { .. } => panic!("expected convert"),
        }
    }

    fn convert_args(argv: &[&str]) -> ConvertArgs {
        let argv = ["kmz2csv", "convert", "a.kml"].iter().chain(argv);
        match Cli::parse_from(argv).command {
            Commands::Convert(args) => args,
            Commands::Inspect { .. } => panic!("expected convert"),
        }
    }

    #[test]
    fn test_overwrite_precedence() {
        let allow: Config = toml::from_str("[output]\noverwrite = true").unwrap();
        let deny = Config::default();

        assert!(convert_args(&[]).overwrite(&allow));
        assert!(!convert_args(&[]).overwrite(&deny));
        assert!(convert_args(&["-f"]).overwrite(&deny));
        assert!(!convert_args(&["--no-force"]).overwrite(&allow));
        // Last flag wins.
        assert!(convert_args(&["--no-force", "--force"]).overwrite(&deny));
        assert!(!convert_args(&["--force", "--no-force"]).overwrite(&allow));
    }

    #[test]
    fn test_log_filter_respects_rust_log() {
        assert_eq!(log_filter(0, None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(log_filter(2, None).max_level_hint(), Some(LevelFilter::DEBUG));
        assert_eq!(
            log_filter(0, Some("debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(
            log_filter(1, Some("kmz2csv=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
        assert_eq!(log_filter(0, Some("  ")).max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_convert_one_kml_and_kmz() {
        let dir = tempfile::tempdir().unwrap();
        let kml = dir.path().join("site.kml");
        std::fs::write(&kml, KML).unwrap();
        let kmz = dir.path().join("Site2.KMZ");
        write_kmz(&kmz);

        let mut converter = Converter::new();
        let mut status = ConsoleStatus::new(true);
        convert_one(&mut converter, &mut status, &kml, None, false).unwrap();
        convert_one(&mut converter, &mut status, &kmz, None, false).unwrap();

        let csv = std::fs::read_to_string(dir.path().join("site.csv")).unwrap();
        assert_eq!(csv.lines().count(), 5);
        assert!(csv.contains("Line,Fence,,4,3,0,1,1"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("Site2.csv")).unwrap(),
            csv
        );

        // Second run without overwrite fails and leaves the file alone.
        assert!(convert_one(&mut converter, &mut status, &kml, None, false).is_err());
        assert!(!converter.is_busy());
    }

    #[test]
    fn test_convert_one_rejects_extension_before_reading() {
        let mut converter = Converter::new();
        let mut status = ConsoleStatus::new(true);
        let err = convert_one(
            &mut converter,
            &mut status,
            Path::new("does-not-exist.gpx"),
            None,
            false,
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<kmz2csv::ConvertError>(),
            Some(kmz2csv::ConvertError::UnrecognizedExtension(_))
        ));
    }

    #[test]
    fn test_summarize_groups() {
        let doc = Document::parse(KML).unwrap();
        let records = extract_placemarks(&doc).unwrap();
        let groups = summarize(&records);
        assert_eq!(groups.len(), 2);
        assert_eq!((groups[0].kind, groups[0].vertices), ("Point", 1));
        assert_eq!((groups[1].kind, groups[1].vertices, groups[1].name), ("Line", 3, "Fence"));
    }
}
