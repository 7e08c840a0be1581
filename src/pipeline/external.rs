//! HEIC and AVIF conversion through external tools.
//!
//! The payload is written to a scratch file with its real suffix (both tools
//! sniff formats partly by extension), the tool writes PNG to a second
//! scratch file, and the PNG is re-encoded in-process when the target is not
//! PNG. Both scratch files are [`TempHandle`]s and vanish on every exit path,
//! including a timeout or a dropped future.
//!
//! [`TempHandle`]: crate::temp::TempHandle

use tracing::{debug, info};

use crate::error::ConvertError;
use crate::format::{Format, TargetFormat};
use crate::request::Payload;
use crate::tool::Tool;

use super::{blocking, raster::transcode_png, Scope};

/// Convert `payload` to `target` by way of `tool`.
pub async fn convert_external(
    tool: Tool,
    payload: &Payload,
    source: Format,
    target: TargetFormat,
    quality: u8,
    scope: &Scope<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let png = decode_via_tool(tool, payload, source, scope).await?;
    if target.format == Format::Png {
        return Ok(png);
    }
    let origin = payload.filename.clone();
    let background = scope.config.background;
    blocking(move || transcode_png(&png, &origin, target, quality, background)).await
}

/// Run `tool` on `payload` and return the PNG it produced.
pub async fn decode_via_tool(
    tool: Tool,
    payload: &Payload,
    source: Format,
    scope: &Scope<'_>,
) -> Result<Vec<u8>, ConvertError> {
    let Scope { config, ctx, temp } = *scope;
    let spec = tool.resolve(config)?;

    let input = temp
        .write(&format!(".{}", source.extension()), &payload.bytes)
        .await?;
    let output = temp.allocate(".png")?;

    ctx.tool_started(tool.name());
    let run = tool
        .conversion(&spec, input.path(), output.path())
        .timeout(config.tool_timeout)
        .run(ctx.cancel_token())
        .await?;
    if !run.stderr.trim().is_empty() {
        debug!(tool = tool.name(), stderr = %run.stderr.trim(), "tool stderr");
    }

    let png = output.read().await?;
    if png.is_empty() {
        return Err(ConvertError::tool_failure(
            tool.name(),
            "exit status: 0",
            "tool exited successfully but wrote no output",
        ));
    }
    info!(
        tool = tool.name(),
        file = %payload.filename,
        bytes = png.len(),
        elapsed_ms = run.elapsed.as_millis() as u64,
        "external conversion finished"
    );
    Ok(png)
}
