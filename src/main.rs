use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use listenbrainz_convert::cache::ResultCache;
use listenbrainz_convert::pipeline;
use listenbrainz_convert::progress::{self, create_spinner, format_duration};
use listenbrainz_convert::record::RecordBuilder;
use listenbrainz_convert::resolver::Resolver;
use listenbrainz_convert::safety::validate_run_paths;
use listenbrainz_convert::spotify::{fetch_access_token, http_agent, SpotifyClient};

#[derive(Parser)]
#[command(name = "listenbrainz-convert")]
#[command(about = "Convert a ListenBrainz export into Spotify extended streaming history")]
struct Args {
    /// Folder scanned recursively for .jsonl listen exports
    data_folder: PathBuf,

    #[arg(long, default_value = "spotify_streaming_history.json")]
    output: PathBuf,

    #[arg(long, default_value = "spotify_api_cache.json")]
    cache: PathBuf,

    #[arg(long, default_value = "unknown_songs.txt")]
    unknowns: PathBuf,

    /// Spotify application client id
    #[arg(long, env = "SPOTIFY_CLIENT_ID")]
    client_id: String,

    /// Spotify application client secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,

    /// Display username stamped on every record
    #[arg(long, env = "USERNAME", default_value = "your_username")]
    username: String,

    /// Two-letter country code stamped on every record
    #[arg(long, env = "COUNTRY_CODE", default_value = "XX")]
    country_code: String,

    /// Hide progress bars and log plain lines instead
    #[arg(long)]
    log_only: bool,

    /// Write run statistics to this path as JSON
    #[arg(long)]
    stats_json: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    progress::set_log_only(args.log_only);

    validate_run_paths(&args.data_folder, &args.output, &args.cache, &args.unknowns)?;

    let spinner = create_spinner("Fetching access token");
    let agent = http_agent();
    let token = fetch_access_token(&agent, &args.client_id, &args.client_secret)
        .context("Spotify token exchange failed")?;
    spinner.finish_with_message("Access token acquired");

    let cache = ResultCache::load(&args.cache)
        .with_context(|| format!("failed to load cache {}", args.cache.display()))?;
    println!("Loaded cache with {} entries", cache.len());

    let resolver = Resolver::new(SpotifyClient::new(agent, &token), cache);
    let builder = RecordBuilder::new(resolver, args.username, args.country_code);

    let stats = pipeline::run(&args.data_folder, builder, &args.output, &args.unknowns)?;

    if let Some(path) = &args.stats_json {
        stats
            .write_to_file(path)
            .with_context(|| format!("failed to write stats file {}", path.display()))?;
    }

    let (hours, minutes) = stats.play_time_hours_minutes();
    println!("\n{:=<60}", "");
    println!("Conversion complete!");
    println!("  Converted:       {}", stats.converted);
    println!("  Skipped Spotify: {}", stats.skipped_spotify);
    println!("  Parse errors:    {}", stats.parse_errors);
    println!("  Unique artists:  {}", stats.unique_artists);
    println!("  Unique tracks:   {}", stats.unique_tracks);
    println!("  Total play time: {}h {}m", hours, minutes);
    println!("  Unmatched:       {}", stats.unmatched);
    println!(
        "  Match rate:      {:.1}% ({} cache hits, {} API queries)",
        stats.match_rate(),
        stats.cache_hits,
        stats.api_queries
    );
    println!(
        "  Elapsed:         {}",
        format_duration(std::time::Duration::from_secs_f64(stats.elapsed_seconds))
    );
    println!("{:=<60}", "");
    println!("  Output file:   {}", args.output.display());
    println!("  Cache file:    {}", args.cache.display());
    println!("  Unknowns list: {}", args.unknowns.display());

    Ok(())
}
