use clap::Parser;
use mpv::MpvOptions;
use vidsrc::resolver::SourceResolver;
use vidsrc::selector::{ProviderSelector, Resolved};

pub(crate) mod cli;
pub(crate) mod logger;
pub(crate) mod mpv;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Parse arguments
    let args = cli::Args::parse();
    let debug = args.debug;

    // Set up logger
    if let Err(err) = logger::init_logger(debug) {
        eprintln!("Failed to set up logger: {err}");
    }

    let resolver = SourceResolver::new(args.get_resolver_config());
    let selector = ProviderSelector::new(resolver.config().get_providers().clone());
    let media = args.get_media_request();

    // The data id identifies the title for every provider, fetch it once
    let data_id = match resolver.fetch_data_id(&media).await {
        Ok(data_id) => data_id,
        Err(err) => {
            log::error!("Failed to look up {} {}: {:#}", media.kind, media.id, anyhow::Error::from(err));
            std::process::exit(1);
        }
    };

    let Resolved { provider, sources } = match selector
        .select(&args.source, |provider| resolver.resolve(&data_id, provider))
        .await
    {
        Ok(resolved) => resolved,
        Err(err) => {
            log::error!("{:#}", anyhow::Error::from(err));
            std::process::exit(1);
        }
    };

    log::info!("Streams from {}:", provider);
    for stream in &sources.streams {
        println!("{stream}");
    }

    if !sources.subtitles.is_empty() {
        log::info!("Subtitles:");
        for (label, file) in &sources.subtitles {
            println!("{label}\t{file}");
        }
    }

    if args.mpv {
        // Non-empty, the selector never yields an empty stream list
        let stream = &sources.streams[0];
        let title = match media.episode {
            Some((season, episode)) => format!("{} S{season:0>2}E{episode:0>2}", media.id),
            None => media.id.clone(),
        };
        let options = MpvOptions {
            title: Some(&title),
            subtitle_label: args.default_subtitles.as_deref(),
            fullscreen: !args.no_fullscreen,
            log_ffmpeg_errors: args.log_ffmpeg_errors,
            debug,
        };

        if let Err(err) = mpv::start_mpv(stream, &sources, &options).await {
            log::error!("{:#}", err);
            std::process::exit(1);
        }
    }
}
