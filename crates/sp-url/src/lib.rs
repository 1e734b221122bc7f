//! URL classification for navigation targets.

use sp_core::SpidyError;
use sp_core::SpidyResult;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use url::Url;

/// Scheme used to smuggle Markdown-relative links through the engine.
pub const MARKDOWN_LINK_SCHEME: &str = "spidy-md";

/// Navigation-relevant URL schemes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemeKind {
    Http,
    Https,
    File,
    Ftp,
    Ftps,
    Data,
    Mailto,
    Tel,
    About,
    Javascript,
    Vbscript,
    MarkdownLink,
    Unknown(String),
}

impl SchemeKind {
    pub fn classify(scheme: &str) -> Self {
        let normalized = scheme.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "http" => Self::Http,
            "https" => Self::Https,
            "file" => Self::File,
            "ftp" => Self::Ftp,
            "ftps" => Self::Ftps,
            "data" => Self::Data,
            "mailto" => Self::Mailto,
            "tel" => Self::Tel,
            "about" => Self::About,
            "javascript" => Self::Javascript,
            "vbscript" => Self::Vbscript,
            MARKDOWN_LINK_SCHEME => Self::MarkdownLink,
            _ => Self::Unknown(normalized),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::File => "file",
            Self::Ftp => "ftp",
            Self::Ftps => "ftps",
            Self::Data => "data",
            Self::Mailto => "mailto",
            Self::Tel => "tel",
            Self::About => "about",
            Self::Javascript => "javascript",
            Self::Vbscript => "vbscript",
            Self::MarkdownLink => MARKDOWN_LINK_SCHEME,
            Self::Unknown(name) => name.as_str(),
        }
    }

    pub fn is_script(&self) -> bool {
        matches!(self, Self::Javascript | Self::Vbscript)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured navigation target.
///
/// Unlike a network URL this accepts every scheme, including opaque ones
/// such as `javascript:` and `mailto:`; policy decides what happens next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavUrl {
    parsed: Url,
    scheme: SchemeKind,
}

impl NavUrl {
    pub fn parse(input: &str) -> SpidyResult<Self> {
        let parsed = Url::parse(input.trim()).map_err(|error| {
            SpidyError::new(
                "url.invalid",
                format!("failed to parse URL `{input}`: {error}"),
            )
        })?;
        Ok(Self::from_url(parsed))
    }

    pub fn from_url(parsed: Url) -> Self {
        let scheme = SchemeKind::classify(parsed.scheme());
        Self { parsed, scheme }
    }

    pub fn from_file_path(path: &Path) -> SpidyResult<Self> {
        let parsed = Url::from_file_path(path).map_err(|()| {
            SpidyError::new(
                "url.file_path_invalid",
                format!("`{}` is not an absolute file path", path.display()),
            )
        })?;
        Ok(Self::from_url(parsed))
    }

    pub fn scheme(&self) -> &SchemeKind {
        &self.scheme
    }

    pub fn scheme_name(&self) -> &str {
        self.scheme.as_str()
    }

    pub fn host(&self) -> Option<&str> {
        self.parsed.host_str()
    }

    pub fn path(&self) -> &str {
        self.parsed.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.parsed.query()
    }

    pub fn fragment(&self) -> Option<&str> {
        self.parsed.fragment()
    }

    /// Serialized form, as the engine would report it.
    pub fn as_str(&self) -> &str {
        self.parsed.as_str()
    }

    pub fn serialized_len(&self) -> usize {
        self.parsed.as_str().chars().count()
    }

    pub fn as_url(&self) -> &Url {
        &self.parsed
    }

    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.scheme != SchemeKind::File {
            return None;
        }
        self.parsed.to_file_path().ok()
    }

    /// Decoded final path component of a file URL. A remote host is
    /// ignored, so `file://server/share/x.html` still yields `x.html`.
    pub fn file_name(&self) -> Option<String> {
        if self.scheme != SchemeKind::File {
            return None;
        }
        let path = self.parsed.to_file_path().ok().or_else(|| {
            let mut local = self.parsed.clone();
            local.set_host(None).ok()?;
            local.to_file_path().ok()
        })?;
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
    }

    /// Reinterprets the file's basename as an `http://` address.
    pub fn http_fallback(&self) -> Option<Self> {
        let name = self.file_name()?;
        Self::parse(&format!("http://{name}")).ok()
    }

    pub fn has_extension(&self, extensions: &[String]) -> bool {
        let Some(extension) = Path::new(self.parsed.path()).extension() else {
            return false;
        };
        let extension = extension.to_string_lossy();
        extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(&extension))
    }
}

impl fmt::Display for NavUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
