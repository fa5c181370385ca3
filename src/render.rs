// 🖼️ Render Model + image collaborators
//
// The core never draws pixels itself. It resolves a `RenderedBoard` (titles,
// images, cell texts, accent colors), waits for every embedded image, then
// hands the board to a `Rasterizer`. The resulting image goes to share
// targets, each best-effort, with a local file download as the one
// guaranteed fallback.

use crate::board::Board;
use crate::grade::{accent_for, Rgb};
use crate::protocol::{trim_leading_empty, RowDocument};
use crate::ranking;
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::process::Command as Process;

/// Image shown for rows without one
pub const PLACEHOLDER_IMAGE: &str = "placeholder.png";

/// Download name used by the share/export-image flow
pub const SHARE_FILE_STEM: &str = "tierlist";

// ============================================================================
// RENDER MODEL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedRow {
    pub title: String,
    pub image_href: String,
    pub cells: Vec<Option<String>>,
    pub score: Option<f64>,
    pub accent: Option<Rgb>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedBoard {
    pub title: String,
    pub labels: Vec<String>,
    pub rows: Vec<RenderedRow>,
    /// Footer credit, e.g. "Created by: Ana"
    pub credit: Option<String>,
}

fn href_or_placeholder(image: Option<&str>) -> String {
    match image {
        Some(src) if !src.is_empty() => src.to_string(),
        _ => PLACEHOLDER_IMAGE.to_string(),
    }
}

impl RenderedBoard {
    /// Editable board as currently ranked (no trimming)
    pub fn from_board(board: &Board) -> Self {
        let rows = board
            .rows
            .iter()
            .map(|row| RenderedRow {
                title: row.title.clone(),
                image_href: href_or_placeholder(row.image.as_deref()),
                cells: row.cell_labels(),
                score: row.score(),
                accent: accent_for(row.score()),
            })
            .collect();

        RenderedBoard {
            title: board.title.clone(),
            labels: board.labels.clone(),
            rows,
            credit: None,
        }
    }

    /// Read-only view of a saved snapshot: rows keep their saved order and
    /// lose their leading empty cells.
    pub fn read_only(title: &str, labels: &[String], rows: &[RowDocument], author: Option<&str>) -> Self {
        let rows = rows
            .iter()
            .map(|doc| {
                let cells = trim_leading_empty(&doc.cells).to_vec();
                let score = ranking::compute_row_score(&doc.to_row());
                RenderedRow {
                    title: doc.title.clone(),
                    image_href: href_or_placeholder(Some(doc.img.as_str())),
                    cells,
                    score,
                    accent: accent_for(score),
                }
            })
            .collect();

        RenderedBoard {
            title: if title.is_empty() { "Tier List".to_string() } else { title.to_string() },
            labels: labels.to_vec(),
            rows,
            credit: author.map(|a| format!("Created by: {}", a)),
        }
    }

    pub fn with_credit(mut self, author: &str) -> Self {
        self.credit = Some(format!("Created by: {}", author));
        self
    }

    /// Every distinct image href, in first-seen order
    pub fn image_hrefs(&self) -> Vec<&str> {
        let mut hrefs: Vec<&str> = Vec::new();
        for row in &self.rows {
            if !hrefs.contains(&row.image_href.as_str()) {
                hrefs.push(&row.image_href);
            }
        }
        hrefs
    }
}

// ============================================================================
// IMAGE LOADING
// ============================================================================

pub trait ImageLoader {
    /// Resolve one image. Errors mean "finished, but broken".
    fn load(&self, href: &str) -> Result<()>;
}

/// Decodes embedded `data:` images; other references are left to the renderer
#[derive(Debug, Default, Clone, Copy)]
pub struct DataUriLoader;

impl ImageLoader for DataUriLoader {
    fn load(&self, href: &str) -> Result<()> {
        if let Some(rest) = href.strip_prefix("data:") {
            let (meta, payload) = rest.split_once(',').context("data URI has no payload")?;
            if meta.ends_with(";base64") {
                BASE64.decode(payload).context("data URI payload is not base64")?;
            }
        }
        Ok(())
    }
}

/// Wait for every image to finish (successfully or not).
/// Returns how many loaded cleanly.
pub fn wait_for_images(board: &RenderedBoard, loader: &dyn ImageLoader) -> usize {
    let mut ok = 0;
    for href in board.image_hrefs() {
        match loader.load(href) {
            Ok(()) => ok += 1,
            Err(e) => tracing::warn!(href = %truncate(href, 48), error = %e, "image failed to load; rendering without it"),
        }
    }
    ok
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{}…", cut)
    }
}

// ============================================================================
// RASTERIZATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl RasterImage {
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }

    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/svg+xml" => "svg",
            _ => "bin",
        }
    }

    /// File name for downloads, e.g. `tierlist.svg`
    pub fn filename(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }
}

pub trait Rasterizer {
    fn rasterize(&self, board: &RenderedBoard) -> Result<RasterImage>;
}

/// Renders the board as a standalone SVG document
#[derive(Debug, Clone)]
pub struct SvgRasterizer {
    pub cell_width: u32,
    pub row_height: u32,
    pub title_width: u32,
    pub padding: u32,
}

impl Default for SvgRasterizer {
    fn default() -> Self {
        SvgRasterizer {
            cell_width: 72,
            row_height: 64,
            title_width: 160,
            padding: 12,
        }
    }
}

/// Width of the accent band drawn at the left of a graded row
const BAND_WIDTH: u32 = 19;

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

impl SvgRasterizer {
    pub fn render_svg(&self, board: &RenderedBoard) -> String {
        let columns = board
            .rows
            .iter()
            .map(|r| r.cells.len())
            .chain(std::iter::once(board.labels.len()))
            .max()
            .unwrap_or(0) as u32;

        let image_x = self.padding + BAND_WIDTH + 4;
        let title_x = image_x + self.row_height;
        let grid_x = title_x + self.title_width;
        let width = grid_x + columns * self.cell_width + self.padding;
        let header = self.row_height / 2;
        let footer = if board.credit.is_some() { 20 } else { 0 };
        let height = self.padding * 2 + header + board.rows.len() as u32 * self.row_height + footer;

        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        svg.push_str(&format!(r##"<rect width="{}" height="{}" fill="#ffffff"/>"##, width, height));
        svg.push_str(&format!(r#"<title>{}</title>"#, escape_xml(&board.title)));

        // Label row
        for (i, label) in board.labels.iter().enumerate() {
            let x = grid_x + i as u32 * self.cell_width + self.cell_width / 2;
            svg.push_str(&format!(
                r##"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="13" font-weight="bold" text-anchor="middle" fill="#000">{}</text>"##,
                x,
                self.padding + header - 8,
                escape_xml(label)
            ));
        }

        for (r, row) in board.rows.iter().enumerate() {
            let y = self.padding + header + r as u32 * self.row_height;

            if let Some(accent) = row.accent {
                svg.push_str(&format!(
                    r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}"/>"#,
                    self.padding,
                    y,
                    BAND_WIDTH,
                    self.row_height - 4,
                    accent.to_hex()
                ));
            }

            svg.push_str(&format!(
                r#"<image x="{}" y="{}" width="{s}" height="{s}" xlink:href="{}"/>"#,
                image_x,
                y + 2,
                escape_xml(&row.image_href),
                s = self.row_height - 8
            ));

            svg.push_str(&format!(
                r##"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="14" fill="#000">{}</text>"##,
                title_x + 4,
                y + self.row_height / 2,
                escape_xml(&row.title)
            ));

            for (c, cell) in row.cells.iter().enumerate() {
                let x = grid_x + c as u32 * self.cell_width;
                svg.push_str(&format!(
                    r##"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="#cccccc"/>"##,
                    x + 2,
                    y + 2,
                    self.cell_width - 4,
                    self.row_height - 8
                ));
                if let Some(text) = cell {
                    svg.push_str(&format!(
                        r##"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="16" font-weight="bold" text-anchor="middle" fill="#222">{}</text>"##,
                        x + self.cell_width / 2,
                        y + self.row_height / 2,
                        escape_xml(text)
                    ));
                }
            }
        }

        if let Some(credit) = &board.credit {
            svg.push_str(&format!(
                r##"<text x="{}" y="{}" font-family="Arial, sans-serif" font-size="10" fill="#666">{}</text>"##,
                self.padding.saturating_sub(4),
                height - 8,
                escape_xml(credit)
            ));
        }

        svg.push_str("</svg>");
        svg
    }
}

impl Rasterizer for SvgRasterizer {
    fn rasterize(&self, board: &RenderedBoard) -> Result<RasterImage> {
        Ok(RasterImage {
            mime: "image/svg+xml".to_string(),
            bytes: self.render_svg(board).into_bytes(),
        })
    }
}

/// Wait for images, then rasterize
pub fn render_image(
    board: &RenderedBoard,
    loader: &dyn ImageLoader,
    rasterizer: &dyn Rasterizer,
) -> Result<RasterImage> {
    let loaded = wait_for_images(board, loader);
    tracing::debug!(loaded, rows = board.rows.len(), "images settled; rasterizing");
    rasterizer.rasterize(board)
}

// ============================================================================
// SHARE TARGETS
// ============================================================================

pub trait ShareTarget {
    fn name(&self) -> &str;
    fn deliver(&self, image: &RasterImage, filename: &str) -> Result<()>;
}

/// Writes the image into a directory. This is the guaranteed fallback.
#[derive(Debug, Clone)]
pub struct FileDownload {
    pub dir: PathBuf,
}

impl FileDownload {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileDownload { dir: dir.into() }
    }

    pub fn save(&self, bytes: &[u8], filename: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create download dir {:?}", self.dir))?;
        let path = self.dir.join(filename);
        fs::write(&path, bytes).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}

impl ShareTarget for FileDownload {
    fn name(&self) -> &str {
        "download"
    }

    fn deliver(&self, image: &RasterImage, filename: &str) -> Result<()> {
        self.save(&image.bytes, filename).map(|_| ())
    }
}

/// Pipes the image into an external program (clipboard tool, share sheet...)
#[derive(Debug, Clone)]
pub struct CommandTarget {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandTarget {
    /// Parse a whitespace-separated command line, e.g. `wl-copy --type image/svg+xml`
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(CommandTarget {
            program,
            args: parts.collect(),
        })
    }
}

impl ShareTarget for CommandTarget {
    fn name(&self) -> &str {
        &self.program
    }

    fn deliver(&self, image: &RasterImage, _filename: &str) -> Result<()> {
        use std::io::Write;

        let mut child = Process::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.program))?;

        // stdin is closed at the end of the match so the child sees EOF
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&image.bytes),
            None => Ok(()),
        };

        let status = child.wait()?;
        written.with_context(|| format!("Failed to write image to {}", self.program))?;
        if !status.success() {
            bail!("{} exited with {}", self.program, status);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareReport {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
    pub download: Option<PathBuf>,
}

/// Try every target independently, then always save a local copy.
///
/// Only the download can fail the operation.
pub fn share_everywhere(
    image: &RasterImage,
    filename: &str,
    targets: &[&dyn ShareTarget],
    download: &FileDownload,
) -> Result<ShareReport> {
    let mut report = ShareReport::default();

    for target in targets {
        match target.deliver(image, filename) {
            Ok(()) => {
                tracing::info!(target = target.name(), "image shared");
                report.delivered.push(target.name().to_string());
            }
            Err(e) => {
                tracing::warn!(target = target.name(), error = %e, "share target failed; continuing");
                report.failed.push(target.name().to_string());
            }
        }
    }

    let path = download.save(&image.bytes, filename)?;
    report.download = Some(path);
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
