//! Markdown-to-HTML rendering and the `spidy-md` link round-trip.
//!
//! A rendered Markdown file is shown as an in-memory document with an empty
//! base, so relative links between Markdown files would otherwise resolve
//! against nothing. Links to other Markdown files are therefore rewritten at
//! render time into `spidy-md://open?target=<href>`, and the navigation gate
//! turns that back into a real `file://` URL relative to the source file.

use pulldown_cmark::CowStr;
use pulldown_cmark::Event;
use pulldown_cmark::Options;
use pulldown_cmark::Parser;
use pulldown_cmark::Tag;
use pulldown_cmark::TagEnd;
use sp_core::SpidyError;
use sp_core::SpidyResult;
use sp_url::MARKDOWN_LINK_SCHEME;
use sp_url::NavUrl;
use sp_url::SchemeKind;
use std::path::Path;
use std::path::PathBuf;
use tracing::debug;
use url::Url;

const TARGET_PARAM: &str = "target";
const DOCUMENT_STYLE: &str = "body{font-family:sans-serif;max-width:48em;margin:2em auto;padding:0 1em;line-height:1.5}\
pre{background:#f4f4f4;padding:.75em;overflow:auto}\
code{font-family:monospace}\
table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:.25em .5em}";

/// Default file extensions treated as Markdown.
pub fn default_extensions() -> Vec<String> {
    vec!["md".to_owned(), "markdown".to_owned()]
}

/// HTML document synthesized from a Markdown source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownDocument {
    pub source_path: PathBuf,
    pub title: String,
    pub html: String,
}

impl MarkdownDocument {
    pub fn source_dir(&self) -> Option<&Path> {
        self.source_path.parent()
    }
}

/// Out-of-band Markdown conversion used by the navigation gate.
pub trait MarkdownConverter {
    fn convert(&self, source: &str, source_path: &Path) -> SpidyResult<MarkdownDocument>;
}

/// CommonMark converter backed by `pulldown-cmark`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmarkConverter {
    extensions: Vec<String>,
}

impl Default for CmarkConverter {
    fn default() -> Self {
        Self::new(default_extensions())
    }
}

impl CmarkConverter {
    pub fn new(extensions: Vec<String>) -> Self {
        Self { extensions }
    }
}

impl MarkdownConverter for CmarkConverter {
    fn convert(&self, source: &str, source_path: &Path) -> SpidyResult<MarkdownDocument> {
        let options = Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_FOOTNOTES;

        let mut rewritten = 0_usize;
        let events: Vec<Event<'_>> = Parser::new_ext(source, options)
            .map(|event| match event {
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    id,
                }) => {
                    let dest_url = match rewrite_link(&dest_url, &self.extensions) {
                        Some(pseudo) => {
                            rewritten += 1;
                            CowStr::from(pseudo)
                        }
                        None => dest_url,
                    };
                    Event::Start(Tag::Link {
                        link_type,
                        dest_url,
                        title,
                        id,
                    })
                }
                other => other,
            })
            .collect();

        let title = first_heading(&events).unwrap_or_else(|| {
            source_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Markdown document".to_owned())
        });

        let mut body = String::with_capacity(source.len().saturating_mul(3) / 2);
        pulldown_cmark::html::push_html(&mut body, events.into_iter());

        debug!(
            path = %source_path.display(),
            rewritten_links = rewritten,
            "rendered markdown document"
        );

        Ok(MarkdownDocument {
            source_path: source_path.to_path_buf(),
            html: wrap_document(&title, &body),
            title,
        })
    }
}

fn first_heading(events: &[Event<'_>]) -> Option<String> {
    let start = events
        .iter()
        .position(|event| matches!(event, Event::Start(Tag::Heading { .. })))?;

    let mut text = String::new();
    for event in &events[start + 1..] {
        match event {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(value) | Event::Code(value) => text.push_str(value),
            _ => {}
        }
    }

    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_owned())
    }
}

fn wrap_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{DOCUMENT_STYLE}</style>\n</head>\n<body>\n{body}</body>\n</html>\n",
        escape_html(title)
    )
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Rewrites a link to another Markdown file into the `spidy-md` form.
///
/// Returns `None` for links that should be left alone: web addresses,
/// in-page anchors and non-Markdown targets.
pub fn rewrite_link(dest: &str, extensions: &[String]) -> Option<String> {
    let dest = dest.trim();
    if dest.is_empty() || dest.starts_with('#') {
        return None;
    }

    let targets_markdown = match Url::parse(dest) {
        Ok(absolute) => {
            absolute.scheme() == "file" && path_has_extension(absolute.path(), extensions)
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let path = dest.split(['#', '?']).next().unwrap_or_default();
            path_has_extension(path, extensions)
        }
        Err(_) => false,
    };

    if !targets_markdown {
        return None;
    }

    let base = format!("{MARKDOWN_LINK_SCHEME}://open");
    Url::parse_with_params(&base, &[(TARGET_PARAM, dest)])
        .ok()
        .map(String::from)
}

fn path_has_extension(path: &str, extensions: &[String]) -> bool {
    let Some(extension) = Path::new(path).extension() else {
        return false;
    };
    let extension = extension.to_string_lossy();
    extensions
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(&extension))
}

/// Decodes a `spidy-md` URL back into the `file://` URL it stands for.
///
/// Relative targets are resolved against `base_dir`, the directory of the
/// Markdown document currently on display.
pub fn resolve_markdown_link(url: &NavUrl, base_dir: Option<&Path>) -> SpidyResult<NavUrl> {
    if url.scheme() != &SchemeKind::MarkdownLink {
        return Err(SpidyError::new(
            "markdown.not_pseudo_scheme",
            format!("`{url}` is not a {MARKDOWN_LINK_SCHEME} link"),
        ));
    }

    let target = url
        .as_url()
        .query_pairs()
        .find(|(key, _)| key == TARGET_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| {
            SpidyError::new(
                "markdown.target_missing",
                format!("`{url}` carries no `{TARGET_PARAM}` parameter"),
            )
        })?;

    let resolved = match Url::parse(&target) {
        Ok(absolute) => absolute,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            join_relative(&target, base_dir)?
        }
        Err(error) => {
            return Err(SpidyError::new(
                "markdown.target_invalid",
                format!("link target `{target}` is malformed: {error}"),
            ));
        }
    };

    if resolved.scheme() != "file" {
        return Err(SpidyError::new(
            "markdown.target_not_file",
            format!("link target `{resolved}` is not a local file"),
        ));
    }

    Ok(NavUrl::from_url(resolved))
}

fn join_relative(target: &str, base_dir: Option<&Path>) -> SpidyResult<Url> {
    let base = if target.starts_with('/') {
        Url::parse("file:///").map_err(|error| {
            SpidyError::new("markdown.base_invalid", format!("root file URL: {error}"))
        })?
    } else {
        let dir = base_dir.ok_or_else(|| {
            SpidyError::new(
                "markdown.base_missing",
                format!("relative link `{target}` has no base document"),
            )
        })?;
        Url::from_directory_path(dir).map_err(|()| {
            SpidyError::new(
                "markdown.base_invalid",
                format!("base directory `{}` is not absolute", dir.display()),
            )
        })?
    };

    base.join(target).map_err(|error| {
        SpidyError::new(
            "markdown.target_invalid",
            format!("cannot resolve `{target}` against `{base}`: {error}"),
        )
    })
}
