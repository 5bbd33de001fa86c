use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use image::{Rgba, RgbaImage};
use pageview_core::{RectF, RenderImage, SearchMatch, Size, SizeF};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::PageBackend;

/// Glyph cell of the fixed-pitch text grid, in page points.
const GLYPH_WIDTH: f64 = 6.0;
const LINE_HEIGHT: f64 = 12.0;
const TEXT_INSET: f64 = 36.0;
/// Characters of surrounding text reported with each match.
const CONTEXT_CHARS: usize = 20;

const PAPER: Rgba<u8> = Rgba([255, 255, 255, 255]);
const INK: Rgba<u8> = Rgba([40, 40, 40, 255]);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticPage {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub text: Vec<String>,
}

impl SyntheticPage {
    pub fn size(&self) -> SizeF {
        SizeF::new(self.width, self.height)
    }
}

/// An in-memory document described in TOML. Text is laid out on a fixed
/// grid starting at the top-left inset; consecutive lines join with a space
/// so a query can span a line break.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyntheticDocument {
    #[serde(default)]
    pub pages: Vec<SyntheticPage>,
}

#[derive(Debug, Clone, Copy)]
struct Glyph {
    ch: char,
    line: usize,
    column: usize,
    joiner: bool,
}

impl SyntheticDocument {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let document: SyntheticDocument =
            toml::from_str(source).context("failed to parse document description")?;
        for (index, page) in document.pages.iter().enumerate() {
            if !(page.width.is_finite() && page.height.is_finite()) || page.size().is_empty() {
                bail!("page {index} has invalid size {}x{}", page.width, page.height);
            }
        }
        Ok(document)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("failed to read document {:?}", path))?;
        Self::from_toml_str(&source).with_context(|| format!("invalid document {:?}", path))
    }

    pub fn page_sizes(&self) -> Vec<SizeF> {
        self.pages.iter().map(SyntheticPage::size).collect()
    }

    fn page(&self, page: usize) -> Result<&SyntheticPage> {
        match self.pages.get(page) {
            Some(found) => Ok(found),
            None => bail!("page {page} out of range (document has {})", self.pages.len()),
        }
    }

    fn glyphs(page: &SyntheticPage) -> Vec<Glyph> {
        let mut glyphs = Vec::new();
        for (line, text) in page.text.iter().enumerate() {
            if line > 0 {
                let column = page.text[line - 1].chars().count();
                glyphs.push(Glyph {
                    ch: ' ',
                    line: line - 1,
                    column,
                    joiner: true,
                });
            }
            glyphs.extend(text.chars().enumerate().map(|(column, ch)| Glyph {
                ch,
                line,
                column,
                joiner: false,
            }));
        }
        glyphs
    }
}

fn same_letter(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

fn glyph_rect(line: usize, first: usize, last: usize) -> RectF {
    RectF::new(
        TEXT_INSET + first as f64 * GLYPH_WIDTH,
        TEXT_INSET + line as f64 * LINE_HEIGHT,
        (last - first + 1) as f64 * GLYPH_WIDTH,
        LINE_HEIGHT,
    )
}

impl PageBackend for SyntheticDocument {
    fn render(&self, page: usize, target_size: Size) -> Result<RenderImage> {
        let source = self.page(page)?;
        if target_size.is_empty() {
            bail!("cannot render page {page} at {}x{}", target_size.width, target_size.height);
        }
        let width = target_size.width as u32;
        let height = target_size.height as u32;
        let scale_x = f64::from(width) / source.width;
        let scale_y = f64::from(height) / source.height;

        let mut image = RgbaImage::from_pixel(width, height, PAPER);
        for (line, text) in source.text.iter().enumerate() {
            let columns = text.chars().count();
            if columns == 0 {
                continue;
            }
            let rect = glyph_rect(line, 0, columns - 1);
            // Ink covers the middle half of each text line.
            let top = ((rect.y + rect.height * 0.25) * scale_y) as u32;
            let bottom = (((rect.y + rect.height * 0.75) * scale_y) as u32).min(height);
            let left = (rect.x * scale_x) as u32;
            let right = ((rect.right() * scale_x) as u32).min(width);
            for y in top..bottom {
                for x in left..right {
                    image.put_pixel(x, y, INK);
                }
            }
        }
        trace!(page, width, height, "rendered synthetic page");

        Ok(RenderImage {
            width,
            height,
            pixels: image.into_raw(),
        })
    }

    fn find(&self, page: usize, query: &str) -> Result<Vec<SearchMatch>> {
        let source = self.page(page)?;
        let needle: Vec<char> = query.chars().collect();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let glyphs = Self::glyphs(source);

        let mut matches = Vec::new();
        let mut start = 0;
        while start + needle.len() <= glyphs.len() {
            let window = &glyphs[start..start + needle.len()];
            let hit = window
                .iter()
                .zip(&needle)
                .all(|(glyph, &ch)| same_letter(glyph.ch, ch));
            if !hit {
                start += 1;
                continue;
            }

            let mut spans: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
            for glyph in window.iter().filter(|glyph| !glyph.joiner) {
                spans
                    .entry(glyph.line)
                    .and_modify(|(first, last)| {
                        *first = (*first).min(glyph.column);
                        *last = (*last).max(glyph.column);
                    })
                    .or_insert((glyph.column, glyph.column));
            }
            let rectangles = spans
                .into_iter()
                .map(|(line, (first, last))| glyph_rect(line, first, last))
                .collect();

            let end = start + needle.len();
            let mut found = SearchMatch::new(page, rectangles);
            found.context_before = glyphs[start.saturating_sub(CONTEXT_CHARS)..start]
                .iter()
                .map(|glyph| glyph.ch)
                .collect();
            found.context_after = glyphs[end..(end + CONTEXT_CHARS).min(glyphs.len())]
                .iter()
                .map(|glyph| glyph.ch)
                .collect();
            matches.push(found);
            start = end;
        }
        Ok(matches)
    }
}
