use std::process::Stdio;

use anyhow::Context;
use vidsrc::extractors::ResolvedSourceSet;

#[derive(Debug, Clone, Default)]
pub(crate) struct MpvOptions<'a> {
    pub(crate) title: Option<&'a str>,
    pub(crate) subtitle_label: Option<&'a str>,
    pub(crate) fullscreen: bool,
    pub(crate) log_ffmpeg_errors: bool,
    pub(crate) debug: bool,
}

pub(crate) fn mpv_args(stream: &str, sources: &ResolvedSourceSet, options: &MpvOptions) -> Vec<String> {
    let mut args = Vec::new();

    if options.fullscreen {
        args.push("--fs".to_string());
    }

    if !options.log_ffmpeg_errors {
        args.push("--msg-level=ffmpeg=no".to_string());
    }

    if let Some(referer) = &sources.referer {
        args.push(format!("--referrer={referer}"));
    }

    if let Some(label) = options.subtitle_label {
        match sources.subtitles.get(label) {
            Some(file) => args.push(format!("--sub-file={file}")),
            None => log::warn!("No subtitles labeled \"{}\"", label),
        }
    }

    if let Some(title) = options.title {
        args.push(format!("--force-media-title={title}"));
    }

    args.push("--".to_string());
    args.push(stream.to_string());
    args
}

pub(crate) async fn start_mpv(
    stream: &str,
    sources: &ResolvedSourceSet,
    options: &MpvOptions<'_>,
) -> Result<(), anyhow::Error> {
    let mut mpv_cmd = tokio::process::Command::new(mpv_name());

    if !options.debug {
        mpv_cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        mpv_cmd.arg("--no-terminal");
    }

    let status = mpv_cmd
        .args(mpv_args(stream, sources, options))
        .status()
        .await
        .with_context(|| "failed to start mpv")?;

    if !status.success() {
        log::warn!("mpv exited with {}", status);
    }

    Ok(())
}

fn mpv_name() -> &'static str {
    if cfg!(unix) {
        "mpv"
    } else {
        "mpv.exe"
    }
}
