use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use media_etl::artifacts::ArtifactSink;
use media_etl::catalog::spotify::SpotifyClient;
use media_etl::catalog::{CatalogApi, EntityType};
use media_etl::db::Database;
use media_etl::db::models::{AUDIO_FEATURE, ArtistTrack, DESTINATION_TABLES, LIKED_SONG};
use media_etl::driver::{LoadDriver, LoadSummary};
use media_etl::favorites::FavoriteSync;
use media_etl::features::FeatureSync;
use media_etl::resolver::{Resolution, Resolver};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "media-etl", version, about = "Music metadata ETL with catalog id resolution")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Directory of newline-delimited JSON exports
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,

    /// Never contact the catalog; use offline identifiers only
    #[arg(long, global = true)]
    offline: bool,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drop and recreate the destination tables, then load every source file
    Load,

    /// Resolve one keyword to a catalog identifier
    Resolve {
        /// artist, album, track, playlist, show or episode
        entity: String,

        /// Name to look up
        keyword: String,
    },

    /// Fetch audio features for every resolved or saved track
    Features,

    /// Fetch the account's saved tracks into the liked_song table
    Favorites {
        /// Stop after this many saved tracks
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Query the loaded tables (row counts when no query is given)
    Report(ReportArgs),

    /// List destination tables and their columns
    Tables,
}

#[derive(Args)]
struct ReportArgs {
    /// Artist name as it appears in the exports (repeatable)
    #[arg(short, long)]
    artist: Vec<String>,

    /// Album title (repeatable)
    #[arg(long)]
    album: Vec<String>,

    /// Track title (repeatable)
    #[arg(long)]
    track: Vec<String>,

    /// Artists filed under this genre (repeatable)
    #[arg(short, long)]
    genre: Vec<String>,

    /// Files with this extension, dot included (e.g. .flac)
    #[arg(long)]
    ext: Option<String>,

    /// Albums whose replay gain is below this value
    #[arg(long, allow_negative_numbers = true)]
    gain_below: Option<f64>,

    /// Albums of artists filed under this genre (repeatable)
    #[arg(long)]
    genre_albums: Vec<String>,

    /// Average file size
    #[arg(long)]
    avg_size: bool,

    /// Run the standard query set
    #[arg(long)]
    canned: bool,
}

impl ReportArgs {
    fn canned() -> Self {
        Self {
            artist: vec!["Mazzy Star".into()],
            album: vec!["Debut".into()],
            track: vec!["Future Proof".into()],
            genre: vec!["Trip-Hop".into(), "Alternative".into()],
            ext: Some(".flac".into()),
            gain_below: Some(-4.0),
            genre_albums: vec!["Classical".into()],
            avg_size: true,
            canned: false,
        }
    }

    fn is_empty(&self) -> bool {
        self.artist.is_empty()
            && self.album.is_empty()
            && self.track.is_empty()
            && self.genre.is_empty()
            && self.ext.is_none()
            && self.gain_below.is_none()
            && self.genre_albums.is_empty()
            && !self.avg_size
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let mut config = media_etl::config::AppConfig::load();
    if cli.offline {
        config.catalog.enabled = false;
    }

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(media_etl::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    let sink = ArtifactSink::from_config(&config.debug);
    let client = SpotifyClient::new(&config.catalog);

    match cli.command {
        Commands::Load => {
            let Some(source_dir) = cli.source_dir.or(config.source_dir.clone()) else {
                anyhow::bail!(
                    "No source directory. Pass --source-dir or set source_dir in config."
                );
            };

            let resolver = Resolver::new(&client, &config, &sink);
            let summary = LoadDriver::new(&db, &resolver, &source_dir)
                .reload()
                .context("Reload failed")?;
            print_load_summary(&summary);

            if !summary.success() {
                anyhow::bail!("Load finished with failures (see log)");
            }
        }

        Commands::Resolve { entity, keyword } => {
            let entity: EntityType = entity.parse()?;
            let resolver = Resolver::new(&client, &config, &sink);
            let resolution = resolver
                .resolve(entity, &keyword)
                .context("Resolution failed")?;

            match &resolution {
                Resolution::Matched { id, confidence, ambiguous } => {
                    let flag = if *ambiguous { "  (below threshold)" } else { "" };
                    println!("{entity} '{keyword}': {id} (confidence {confidence:.4}){flag}");
                }
                Resolution::Fallback { id } => {
                    println!("{entity} '{keyword}': {id} (offline)");
                }
                Resolution::Unresolved => {
                    println!("{entity} '{keyword}': {}", resolution.id());
                }
            }
        }

        Commands::Features => {
            if !config.catalog.enabled {
                anyhow::bail!(
                    "Audio features need the catalog; drop --offline or enable [catalog]"
                );
            }
            if !client.is_connected() {
                anyhow::bail!("Catalog not reachable; check access token and base_url");
            }
            let summary = FeatureSync::new(&client, &db, &config.catalog)
                .run()
                .context("Audio feature sync failed")?;
            println!(
                "Audio features: {} requested, {} stored, {} skipped, {} failed batches",
                summary.requested, summary.stored, summary.skipped, summary.failed_batches
            );
        }

        Commands::Favorites { limit } => {
            if !config.catalog.enabled {
                anyhow::bail!("Saved tracks need the catalog; drop --offline or enable [catalog]");
            }
            if !client.is_connected() {
                anyhow::bail!("Catalog not reachable; check access token and base_url");
            }
            let summary = FavoriteSync::new(&client, &db, &config.catalog, &sink)
                .run(limit)
                .context("Saved track sync failed")?;
            println!(
                "Liked songs: {} fetched, {} stored, {} duplicates, {} skipped",
                summary.fetched, summary.stored, summary.duplicates, summary.skipped
            );
            if summary.failed_pages > 0 {
                anyhow::bail!("Saved track paging stopped early (see log)");
            }
        }

        Commands::Report(args) => {
            let args = if args.canned { ReportArgs::canned() } else { args };
            run_report(&db, &args).context("Query failed (run `load` first?)")?;
        }

        Commands::Tables => {
            for table in DESTINATION_TABLES.iter().chain([&AUDIO_FEATURE, &LIKED_SONG]) {
                match db.table_columns(table) {
                    Ok(columns) => println!("{table}: {}", columns.join(", ")),
                    Err(_) => println!("{table}: (missing, run `load`)"),
                }
            }
        }
    }

    Ok(())
}

fn print_load_summary(summary: &LoadSummary) {
    for file in &summary.files {
        let status = if file.succeeded() { "ok" } else { "FAILED" };
        println!(
            "  {:<6} {} ({} records, {} failed, {} rejected)",
            status,
            file.path.display(),
            file.outcome.records.len(),
            file.outcome.failed_count(),
            file.rejected,
        );
        if let Some(err) = &file.error {
            println!("         {err}");
        }
        for (tag, ok) in file.outcome.statuses() {
            if !ok {
                println!("         {tag}");
            }
        }
    }
    println!(
        "Load complete: {} files, {} records, {} failed, {} rejected",
        summary.files.len(),
        summary.records(),
        summary.failed(),
        summary.rejected()
    );
}

fn strs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn run_report(db: &Database, args: &ReportArgs) -> media_etl::db::Result<()> {
    if args.is_empty() {
        println!("Destination tables");
        println!("==================");
        for c in db.table_counts()? {
            println!("  {:<12} {}", c.table, c.rows);
        }
        return Ok(());
    }

    if !args.artist.is_empty() {
        println!("Artists");
        for a in db.artists_by_name(&strs(&args.artist))? {
            let id = or_dash(a.artist_id.as_deref());
            println!("  {:<30} {:<24} {}", a.artist_name, id, or_dash(a.composer.as_deref()));
        }
        for name in &args.artist {
            let rows = db.artist_tracks(name)?;
            if rows.is_empty() {
                println!("No loaded tracks for '{name}'");
            } else {
                print_artist_tracks(name, &rows);
            }
        }
    }

    if !args.album.is_empty() {
        println!("Albums");
        for a in db.albums_by_title(&strs(&args.album))? {
            println!(
                "  {:<30} {:<24} {:>4}  {}",
                a.album_title,
                or_dash(a.album_id.as_deref()),
                a.year.map_or_else(|| "-".to_string(), |y| y.to_string()),
                a.album_gain.map_or_else(|| "-".to_string(), |g| format!("{g:.2}")),
            );
        }
    }

    if !args.track.is_empty() {
        println!("Tracks");
        for t in db.tracks_by_title(&strs(&args.track))? {
            println!(
                "  {:<30} {:<30} {:<8} {:<4} {}",
                t.track_title,
                or_dash(t.album_title.as_deref()),
                or_dash(t.track_length.as_deref()),
                or_dash(t.rating.as_deref()),
                or_dash(t.artist_id.as_deref()),
            );
        }
    }

    if !args.genre.is_empty() {
        println!("Genres");
        for g in db.genres_in(&strs(&args.genre))? {
            println!("  {:<20} {}", g.music_genre, or_dash(g.artist_name.as_deref()));
        }
    }

    if let Some(ext) = &args.ext {
        println!("Files ({ext})");
        for f in db.files_with_ext(ext)? {
            println!(
                "  {:<40} {}",
                or_dash(f.file_name.as_deref()),
                or_dash(f.encoding.as_deref())
            );
        }
    }

    if let Some(threshold) = args.gain_below {
        println!("Album gain below {threshold}");
        for g in db.albums_with_gain_below(threshold)? {
            println!(
                "  {:>7.2}  {:<30} {}",
                g.album_gain,
                or_dash(g.artist_name.as_deref()),
                or_dash(g.album_title.as_deref())
            );
        }
    }

    if !args.genre_albums.is_empty() {
        println!("Albums by genre");
        for r in db.genre_albums(&strs(&args.genre_albums))? {
            println!("  {:<30} {}", r.artist_name, or_dash(r.album_title.as_deref()));
        }
    }

    if args.avg_size {
        match db.average_file_size()? {
            Some(avg) => println!("Average file size: {:.1} MB", avg / 1_000_000.0),
            None => println!("Average file size: no files loaded"),
        }
    }

    Ok(())
}

/// Print an artist's loaded tracks.
fn print_artist_tracks(name: &str, rows: &[ArtistTrack]) {
    let id = or_dash(rows.first().and_then(|r| r.artist_id.as_deref()));
    println!("{name} ({id})");
    println!("{}", "-".repeat(72));
    for r in rows {
        println!(
            "  {:<30} {:>2}  {:<30} {}",
            or_dash(r.album_title.as_deref()),
            r.track_number.unwrap_or(0),
            or_dash(r.track_title.as_deref()),
            or_dash(r.track_id.as_deref()),
        );
    }
}
