use anyhow::{Context, Result};
use parley_core::format::{DisplayNode, ListKind, NodeKind};
use parley_core::media::StructuredMedia;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";
const UNDERLINE: &str = "\x1b[4m";
const CYAN: &str = "\x1b[36m";
const MAGENTA: &str = "\x1b[35m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    /// Markup stripped, no escape sequences.
    #[default]
    Plain,
    Ansi,
}

impl Style {
    /// ANSI when stdout is a terminal and `NO_COLOR` is unset.
    pub fn detect() -> Self {
        if std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none() {
            Style::Ansi
        } else {
            Style::Plain
        }
    }

    fn wrap(self, out: &mut String, codes: &[&str], body: impl FnOnce(&mut String)) {
        if self == Style::Plain {
            body(out);
            return;
        }
        for code in codes {
            out.push_str(code);
        }
        body(out);
        out.push_str(RESET);
    }
}

/// Renders display nodes as terminal text.
pub fn render_nodes(nodes: &[DisplayNode], style: Style) -> String {
    let mut out = String::new();
    for node in nodes {
        render_node(&mut out, node, style);
    }
    out
}

fn render_node(out: &mut String, node: &DisplayNode, style: Style) {
    match &node.kind {
        NodeKind::Text { value } => out.push_str(value),
        NodeKind::Heading { level, inline } => {
            let codes: &[&str] = if *level <= 2 {
                &[BOLD, UNDERLINE]
            } else {
                &[BOLD]
            };
            style.wrap(out, codes, |out| render_inline(out, inline, style));
        }
        NodeKind::ListItem {
            kind,
            marker,
            inline,
        } => {
            out.push_str("  ");
            match kind {
                ListKind::Numbered => out.push_str(marker),
                ListKind::Bulleted => out.push('•'),
            }
            out.push(' ');
            render_inline(out, inline, style);
        }
        NodeKind::CodeBlock { code } => {
            start_line(out);
            style.wrap(out, &[DIM], |out| {
                for line in code.trim_matches('\n').lines() {
                    out.push_str("    ");
                    out.push_str(line);
                    out.push('\n');
                }
            });
        }
        NodeKind::InlineCode { text } => match style {
            Style::Plain => {
                out.push('`');
                out.push_str(text);
                out.push('`');
            }
            Style::Ansi => style.wrap(out, &[CYAN], |out| out.push_str(text)),
        },
        NodeKind::Bold { inline } => {
            style.wrap(out, &[BOLD], |out| render_inline(out, inline, style));
        }
        NodeKind::Italic { inline } => {
            style.wrap(out, &[ITALIC], |out| render_inline(out, inline, style));
        }
        NodeKind::Media(media) => {
            start_line(out);
            style.wrap(out, &[MAGENTA], |out| out.push_str(&media_summary(media)));
            out.push('\n');
        }
    }
}

fn render_inline(out: &mut String, nodes: &[DisplayNode], style: Style) {
    for node in nodes {
        render_node(out, node, style);
    }
}

fn start_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// One-line description such as `[image image/png, 5 bytes, seed=42]`.
pub fn media_summary(media: &StructuredMedia) -> String {
    let size = match media.bytes() {
        Ok(bytes) => format!("{} bytes", bytes.len()),
        Err(_) => "undecodable payload".to_string(),
    };
    let mut summary = format!(
        "[{} {}, {size}",
        media.kind.label(),
        media.mime_type()
    );
    for (key, value) in &media.metadata {
        summary.push_str(&format!(", {key}={value}"));
    }
    summary.push(']');
    summary
}

/// Writes every media node's decoded payload into `dir`, returning the new file paths.
pub fn save_media(nodes: &[DisplayNode], dir: &Path) -> Result<Vec<PathBuf>> {
    let mut saved = Vec::new();
    for node in nodes {
        let NodeKind::Media(media) = &node.kind else {
            continue;
        };
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let bytes = media
            .bytes()
            .context("media payload is not valid base64")?;
        let path = dir.join(format!(
            "parley-{}.{}",
            Uuid::new_v4(),
            media.kind.file_extension()
        ));
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        saved.push(path);
    }
    Ok(saved)
}
