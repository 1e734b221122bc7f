//! The navigation decision state machine.
//!
//! Rules are evaluated in order and the first applicable one is terminal:
//!
//! 0. `spidy-md` links are decoded and answered with a redirect.
//! 1. Main-frame Markdown files are rendered and queued for substitution.
//! 2. Any other main-frame navigation is allowed.
//! 3. Script schemes are denied.
//! 4. Everything else goes through the scheme policy table.
//!
//! Every terminal branch appends exactly one audit entry.

use crate::audit::AuditLog;
use crate::audit::NavigationAuditEntry;
use crate::audit::NavigationStats;
use crate::config::GateConfig;
use crate::fs::FileSystem;
use crate::fs::StdFileSystem;
use sp_core::NavigationTrigger;
use sp_core::SpidyResult;
use sp_markdown::CmarkConverter;
use sp_markdown::MarkdownConverter;
use sp_markdown::MarkdownDocument;
use sp_security::SchemeLookup;
use sp_security::SchemePolicyTable;
use sp_security::SuspicionDetector;
use sp_security::SuspicionVerdict;
use sp_security::carries_executable_data;
use sp_url::NavUrl;
use sp_url::SchemeKind;
use std::path::Path;
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

const REASON_EXTERNAL: &str = "Handled by external application";
const REASON_FILE_FALLBACK: &str = "File not found, falling back to HTTP";
const REASON_FILE_MISSING: &str = "File not found and no valid fallback";
const REASON_REDIRECT_LIMIT: &str = "Redirect limit exceeded";

/// A navigation the rendering engine is about to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub target_url: NavUrl,
    pub trigger_kind: NavigationTrigger,
    pub is_main_frame: bool,
}

impl NavigationRequest {
    pub fn new(target_url: NavUrl, trigger_kind: NavigationTrigger, is_main_frame: bool) -> Self {
        Self {
            target_url,
            trigger_kind,
            is_main_frame,
        }
    }

    pub fn parse(
        raw_url: &str,
        trigger_kind: NavigationTrigger,
        is_main_frame: bool,
    ) -> SpidyResult<Self> {
        Ok(Self::new(NavUrl::parse(raw_url)?, trigger_kind, is_main_frame))
    }
}

/// What the engine should do with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    Deny,
    /// Abandon this URL and load `target` instead.
    Redirect { target: NavUrl },
}

impl NavigationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Redirect { .. } => "redirect",
        }
    }
}

/// Decision plus everything recorded while reaching it.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationOutcome {
    pub decision: NavigationDecision,
    pub audit: NavigationAuditEntry,
    pub verdict: SuspicionVerdict,
    /// HTTP substitute chosen for a missing local file.
    pub fallback: Option<NavUrl>,
    /// URLs abandoned through redirects before this decision, oldest first.
    pub redirected_from: Vec<String>,
}

struct Ruling {
    decision: NavigationDecision,
    success: bool,
    reason: Option<String>,
    fallback: Option<NavUrl>,
}

impl Ruling {
    fn allow() -> Self {
        Self {
            decision: NavigationDecision::Allow,
            success: true,
            reason: None,
            fallback: None,
        }
    }

    fn allow_noting(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::allow()
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: NavigationDecision::Deny,
            success: false,
            reason: Some(reason.into()),
            fallback: None,
        }
    }

    fn redirect(target: NavUrl, reason: String) -> Self {
        Self {
            decision: NavigationDecision::Redirect { target },
            success: true,
            reason: Some(reason),
            fallback: None,
        }
    }
}

enum TableRule {
    ScriptBlocked,
    Unknown,
    Disallowed,
    External,
    Permitted,
}

/// Navigation policy for a single browsing context.
#[derive(Debug)]
pub struct NavigationGate<F = StdFileSystem, C = CmarkConverter> {
    config: GateConfig,
    policy: SchemePolicyTable,
    detector: SuspicionDetector,
    audit: AuditLog,
    suspicious_attempts: u64,
    pending_substitution: Option<MarkdownDocument>,
    current_document_dir: Option<PathBuf>,
    fs: F,
    converter: C,
}

impl NavigationGate {
    pub fn new(config: GateConfig) -> SpidyResult<Self> {
        let converter = CmarkConverter::new(config.markdown_extensions.clone());
        Self::with_parts(config, StdFileSystem, converter)
    }
}

impl<F: FileSystem, C: MarkdownConverter> NavigationGate<F, C> {
    pub fn with_parts(config: GateConfig, fs: F, converter: C) -> SpidyResult<Self> {
        config.validate()?;

        Ok(Self {
            policy: SchemePolicyTable::from_config(&config.security),
            detector: SuspicionDetector::new(&config.security),
            audit: AuditLog::with_capacity(config.audit_capacity),
            suspicious_attempts: 0,
            pending_substitution: None,
            current_document_dir: None,
            fs,
            converter,
            config,
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn policy_table(&self) -> &SchemePolicyTable {
        &self.policy
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn suspicious_attempts(&self) -> u64 {
        self.suspicious_attempts
    }

    pub fn stats(&self) -> NavigationStats {
        NavigationStats::from_log(&self.audit, self.suspicious_attempts)
    }

    pub fn has_pending_substitution(&self) -> bool {
        self.pending_substitution.is_some()
    }

    /// Directory of the Markdown or local document on display, used to
    /// resolve relative `spidy-md` links.
    pub fn current_document_dir(&self) -> Option<&Path> {
        self.current_document_dir.as_deref()
    }

    /// Evaluates one request. A `Redirect` decision is returned as-is; use
    /// [`NavigationGate::navigate`] to follow it.
    pub fn decide(&mut self, request: NavigationRequest) -> NavigationOutcome {
        let started = Instant::now();
        let url = &request.target_url;

        debug!(
            url = %url,
            trigger = request.trigger_kind.label(),
            main_frame = request.is_main_frame,
            scheme = url.scheme_name(),
            "navigation request"
        );

        let verdict = self.screen(url);
        let ruling = self.evaluate_rules(&request);
        self.finish(&request, started, ruling, verdict)
    }

    /// Evaluates a request and follows `spidy-md` redirects, resubmitting
    /// each target as a new `Redirect` navigation in the same frame.
    pub fn navigate(&mut self, request: NavigationRequest) -> NavigationOutcome {
        let is_main_frame = request.is_main_frame;
        let mut redirected_from = Vec::new();
        let mut outcome = self.decide(request);

        while let NavigationDecision::Redirect { target } = &outcome.decision {
            let next = NavigationRequest::new(
                target.clone(),
                NavigationTrigger::Redirect,
                is_main_frame,
            );
            redirected_from.push(outcome.audit.url.clone());

            if redirected_from.len() > self.config.max_redirect_hops {
                outcome = self.refuse_redirect(next);
                break;
            }

            outcome = self.decide(next);
        }

        outcome.redirected_from = redirected_from;
        outcome
    }

    /// Load-completion hook. Hands out the queued Markdown document at most
    /// once; a failed load discards it.
    pub fn on_load_finished(&mut self, ok: bool) -> Option<MarkdownDocument> {
        let document = self.pending_substitution.take()?;

        if !ok {
            warn!(
                path = %document.source_path.display(),
                "load failed, dropping pending markdown substitution"
            );
            return None;
        }

        info!(
            path = %document.source_path.display(),
            title = %document.title,
            "substituting rendered markdown document"
        );
        Some(document)
    }

    fn evaluate_rules(&mut self, request: &NavigationRequest) -> Ruling {
        let url = &request.target_url;

        if url.scheme() == &SchemeKind::MarkdownLink {
            return self.resolve_markdown_link(url);
        }

        if request.is_main_frame {
            if let Some(ruling) = self.try_render_markdown(url) {
                return ruling;
            }

            info!(url = %url, "allowing main frame navigation");
            self.commit_main_frame(url);
            return Ruling::allow();
        }

        match request.trigger_kind {
            NavigationTrigger::LinkClicked => info!(url = %url, "link clicked"),
            NavigationTrigger::FormSubmitted => info!(url = %url, "form submitted"),
            NavigationTrigger::BackForward => info!(url = %url, "back/forward navigation"),
            NavigationTrigger::Reload => info!(url = %url, "page reload"),
            NavigationTrigger::Redirect => info!(url = %url, "redirect"),
            NavigationTrigger::Typed | NavigationTrigger::Other => {}
        }

        let scheme = url.scheme_name().to_owned();
        let rule = match self.policy.lookup(url.scheme()) {
            SchemeLookup::ScriptBlocked => TableRule::ScriptBlocked,
            SchemeLookup::Unknown => TableRule::Unknown,
            SchemeLookup::Listed(policy) if !policy.allowed => TableRule::Disallowed,
            SchemeLookup::Listed(policy) if policy.external_handoff => TableRule::External,
            SchemeLookup::Listed(_) => TableRule::Permitted,
        };

        match rule {
            TableRule::ScriptBlocked => {
                warn!(scheme = %scheme, "script scheme not supported for security reasons");
                Ruling::deny(format!("Script scheme '{scheme}' blocked"))
            }
            TableRule::Unknown => {
                warn!(scheme = %scheme, "unknown scheme, attempting navigation with caution");
                Ruling::allow_noting(format!("Unknown scheme '{scheme}' allowed with caution"))
            }
            TableRule::Disallowed => {
                warn!(scheme = %scheme, "navigation blocked, scheme is not allowed");
                Ruling::deny(format!("Scheme '{scheme}' is not allowed"))
            }
            TableRule::External => {
                info!(scheme = %scheme, "external scheme, deferring to external application");
                Ruling {
                    decision: NavigationDecision::Deny,
                    ..Ruling::allow_noting(REASON_EXTERNAL)
                }
            }
            TableRule::Permitted => self.permitted_scheme(url),
        }
    }

    fn permitted_scheme(&mut self, url: &NavUrl) -> Ruling {
        match url.scheme() {
            SchemeKind::File => self.local_file(url),
            SchemeKind::Http | SchemeKind::Https | SchemeKind::Ftp | SchemeKind::Ftps => {
                info!(url = %url, scheme = url.scheme_name(), "allowing navigation");
                Ruling::allow()
            }
            SchemeKind::Data => {
                info!("processing data URI");
                if carries_executable_data(url) {
                    self.suspicious_attempts += 1;
                    warn!("potentially unsafe data URI with executable content");
                }
                Ruling::allow()
            }
            _ => {
                info!(scheme = url.scheme_name(), "allowing navigation via default handler");
                Ruling::allow()
            }
        }
    }

    fn local_file(&self, url: &NavUrl) -> Ruling {
        let path = url.to_file_path();
        if let Some(path) = &path {
            debug!(path = %path.display(), "handling file URL");
            if self.fs.exists(path) {
                info!(path = %path.display(), "file exists, allowing navigation");
                return Ruling::allow();
            }
        }

        warn!(url = %url, "file does not exist");
        match url.http_fallback() {
            Some(fallback) => {
                info!(fallback = %fallback, "attempting fallback to HTTP");
                Ruling {
                    fallback: Some(fallback),
                    ..Ruling::allow_noting(REASON_FILE_FALLBACK)
                }
            }
            None => {
                error!(url = %url, "navigation failed, file not found and no valid fallback");
                Ruling::deny(REASON_FILE_MISSING)
            }
        }
    }

    fn resolve_markdown_link(&self, url: &NavUrl) -> Ruling {
        match sp_markdown::resolve_markdown_link(url, self.current_document_dir.as_deref()) {
            Ok(target) => {
                info!(target = %target, "redirecting markdown link");
                let reason = format!("Markdown link resolved to {target}");
                Ruling::redirect(target, reason)
            }
            Err(error) => {
                warn!(%error, "markdown link could not be resolved");
                Ruling::deny(format!("Markdown link could not be resolved: {error}"))
            }
        }
    }

    /// Rule 1. `None` means the rule does not apply or conversion failed,
    /// and evaluation falls through to the main-frame fallback.
    fn try_render_markdown(&mut self, url: &NavUrl) -> Option<Ruling> {
        if url.scheme() != &SchemeKind::File
            || !url.has_extension(&self.config.markdown_extensions)
        {
            return None;
        }

        let path = url.to_file_path()?;
        if !self.fs.exists(&path) {
            return None;
        }

        let converted = self
            .fs
            .read_to_string(&path)
            .and_then(|source| self.converter.convert(&source, &path));

        match converted {
            Ok(document) => {
                info!(
                    path = %path.display(),
                    bytes = document.html.len(),
                    "markdown converted, substitution pending until load completes"
                );
                self.current_document_dir = document.source_dir().map(Path::to_path_buf);
                self.pending_substitution = Some(document);
                Some(Ruling::allow())
            }
            Err(error) => {
                warn!(%error, path = %path.display(), "markdown conversion failed, using file navigation");
                None
            }
        }
    }

    fn commit_main_frame(&mut self, url: &NavUrl) {
        if let Some(document) = self.pending_substitution.take() {
            debug!(
                path = %document.source_path.display(),
                "discarding superseded markdown substitution"
            );
        }

        self.current_document_dir = url
            .to_file_path()
            .and_then(|path| path.parent().map(Path::to_path_buf));
    }

    fn refuse_redirect(&mut self, request: NavigationRequest) -> NavigationOutcome {
        let started = Instant::now();
        warn!(
            url = %request.target_url,
            limit = self.config.max_redirect_hops,
            "redirect limit exceeded"
        );
        let verdict = self.screen(&request.target_url);
        self.finish(&request, started, Ruling::deny(REASON_REDIRECT_LIMIT), verdict)
    }

    /// Runs the suspicion checks, counting and logging every hit whatever
    /// the decision turns out to be.
    fn screen(&mut self, url: &NavUrl) -> SuspicionVerdict {
        let verdict = self.detector.evaluate(url);
        if verdict.is_suspicious {
            self.suspicious_attempts += 1;
            warn!(url = %url, "potentially suspicious URL detected");
            for reason in &verdict.reasons {
                warn!("- {reason}");
            }
        }
        verdict
    }

    fn finish(
        &mut self,
        request: &NavigationRequest,
        started: Instant,
        ruling: Ruling,
        verdict: SuspicionVerdict,
    ) -> NavigationOutcome {
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        let entry = NavigationAuditEntry::new(
            request.target_url.as_str(),
            request.trigger_kind,
            request.is_main_frame,
            request.target_url.scheme_name(),
            ruling.success,
            duration_ms,
            ruling.reason,
        );
        let audit = self.audit.append(entry).clone();

        NavigationOutcome {
            decision: ruling.decision,
            audit,
            verdict,
            fallback: ruling.fallback,
            redirected_from: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NavigationDecision;
    use super::NavigationGate;
    use super::NavigationOutcome;
    use super::NavigationRequest;
    use crate::config::GateConfig;
    use crate::fs::FileSystem;
    use sp_core::NavigationTrigger;
    use sp_core::SpidyError;
    use sp_core::SpidyResult;
    use sp_markdown::CmarkConverter;
    use sp_markdown::MarkdownConverter;
    use sp_markdown::MarkdownDocument;
    use std::collections::HashMap;
    use std::path::Path;
    use std::path::PathBuf;

    #[derive(Debug, Default)]
    struct MemoryFileSystem {
        files: HashMap<PathBuf, String>,
    }

    impl MemoryFileSystem {
        fn with_file(mut self, path: &str, contents: &str) -> Self {
            self.files.insert(PathBuf::from(path), contents.to_owned());
            self
        }
    }

    impl FileSystem for MemoryFileSystem {
        fn exists(&self, path: &Path) -> bool {
            self.files.contains_key(path)
        }

        fn read_to_string(&self, path: &Path) -> SpidyResult<String> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| SpidyError::new("fs.read_failed", "missing"))
        }
    }

    #[derive(Debug)]
    struct FailingConverter;

    impl MarkdownConverter for FailingConverter {
        fn convert(&self, _source: &str, _source_path: &Path) -> SpidyResult<MarkdownDocument> {
            Err(SpidyError::new("markdown.convert_failed", "boom"))
        }
    }

    fn gate_with(fs: MemoryFileSystem) -> NavigationGate<MemoryFileSystem, CmarkConverter> {
        NavigationGate::with_parts(GateConfig::default(), fs, CmarkConverter::default())
            .unwrap_or_else(|error| panic!("{error}"))
    }

    fn gate() -> NavigationGate<MemoryFileSystem, CmarkConverter> {
        gate_with(MemoryFileSystem::default())
    }

    fn request(raw: &str, trigger: NavigationTrigger, main_frame: bool) -> NavigationRequest {
        NavigationRequest::parse(raw, trigger, main_frame).unwrap_or_else(|error| panic!("{error}"))
    }

    fn sub_frame_link(raw: &str) -> NavigationRequest {
        request(raw, NavigationTrigger::LinkClicked, false)
    }

    fn reason(outcome: &NavigationOutcome) -> &str {
        outcome.audit.error_reason.as_deref().unwrap_or_default()
    }

    #[test]
    fn script_link_in_sub_frame_is_denied() {
        let mut gate = gate();
        let outcome = gate.decide(sub_frame_link("javascript:alert(1)"));

        assert_eq!(outcome.decision, NavigationDecision::Deny);
        assert!(!outcome.audit.success);
        assert!(reason(&outcome).contains("blocked"));
        assert_eq!(reason(&outcome), "Script scheme 'javascript' blocked");
        assert!(outcome.verdict.is_suspicious);
        assert_eq!(gate.suspicious_attempts(), 1);
    }

    #[test]
    fn vbscript_is_denied_for_every_trigger() {
        let mut gate = gate();
        for trigger in NavigationTrigger::ALL {
            let outcome = gate.decide(request("vbscript:msgbox(1)", trigger, false));
            assert_eq!(outcome.decision, NavigationDecision::Deny);
            assert!(reason(&outcome).contains("blocked"));
        }
    }

    #[test]
    fn mailto_is_handed_off_and_counted_as_success() {
        let mut gate = gate();
        let outcome = gate.decide(sub_frame_link("mailto:a@b.com"));

        assert_eq!(outcome.decision, NavigationDecision::Deny);
        assert!(outcome.audit.success);
        assert_eq!(reason(&outcome), "Handled by external application");

        let tel = gate.decide(sub_frame_link("tel:+15551234"));
        assert_eq!(tel.decision, NavigationDecision::Deny);
        assert!(tel.audit.success);
    }

    #[cfg(unix)]
    #[test]
    fn missing_file_falls_back_to_http() {
        let mut gate = gate();
        let outcome = gate.decide(sub_frame_link("file:///tmp/missing.html"));

        assert_eq!(outcome.decision, NavigationDecision::Allow);
        assert!(outcome.audit.success);
        assert_eq!(reason(&outcome), "File not found, falling back to HTTP");
        assert_eq!(
            outcome.fallback.as_ref().and_then(|url| url.host()),
            Some("missing.html")
        );
    }

    #[test]
    fn missing_file_without_basename_is_denied() {
        let mut gate = gate();
        let outcome = gate.decide(sub_frame_link("file:///"));

        assert_eq!(outcome.decision, NavigationDecision::Deny);
        assert!(!outcome.audit.success);
        assert_eq!(reason(&outcome), "File not found and no valid fallback");
    }

    #[cfg(unix)]
    #[test]
    fn existing_file_is_allowed() {
        let mut gate = gate_with(MemoryFileSystem::default().with_file("/srv/page.html", "<p>"));
        let outcome = gate.decide(sub_frame_link("file:///srv/page.html"));

        assert_eq!(outcome.decision, NavigationDecision::Allow);
        assert_eq!(outcome.audit.error_reason, None);
        assert_eq!(outcome.fallback, None);
    }

    #[test]
    fn web_and_ftp_schemes_are_allowed() {
        let mut gate = gate();
        for raw in [
            "http://example.com/",
            "https://example.com/",
            "ftp://example.com/file.txt",
            "ftps://example.com/file.txt",
            "about:blank",
        ] {
            let outcome = gate.decide(sub_frame_link(raw));
            assert_eq!(outcome.decision, NavigationDecision::Allow, "{raw}");
            assert!(outcome.audit.success);
        }
    }

    #[test]
    fn unknown_scheme_fails_open_with_warning() {
        let mut gate = gate();
        let outcome = gate.decide(sub_frame_link("gopher://example.com/1"));

        assert_eq!(outcome.decision, NavigationDecision::Allow);
        assert!(outcome.audit.success);
        assert_eq!(reason(&outcome), "Unknown scheme 'gopher' allowed with caution");
    }

    #[test]
    fn executable_data_uri_is_allowed_but_counted_twice() {
        let mut gate = gate();
        let outcome = gate.decide(sub_frame_link(
            "data:application/x-msdownload;base64,TVqQAAMAAAAEAAAA",
        ));

        assert_eq!(outcome.decision, NavigationDecision::Allow);
        assert_eq!(gate.suspicious_attempts(), 2);

        let plain = gate.decide(sub_frame_link("data:text/plain,hello"));
        assert_eq!(plain.decision, NavigationDecision::Allow);
        assert_eq!(gate.suspicious_attempts(), 3);
    }

    #[test]
    fn disallowed_table_scheme_is_denied_and_recorded_as_failure() {
        let mut config = GateConfig::default();
        config.security.blocked_schemes = vec!["ftp".to_owned(), "mailto".to_owned()];
        let mut gate =
            NavigationGate::with_parts(config, MemoryFileSystem::default(), CmarkConverter::default())
                .unwrap_or_else(|error| panic!("{error}"));

        for raw in ["ftp://example.com/a", "mailto:a@b.com"] {
            let outcome = gate.decide(sub_frame_link(raw));
            assert_eq!(outcome.decision, NavigationDecision::Deny, "{raw}");
            assert!(!outcome.audit.success);
            assert!(reason(&outcome).ends_with("is not allowed"));
        }
    }

    #[test]
    fn main_frame_navigation_is_always_allowed() {
        let mut gate = gate();
        for raw in [
            "javascript:alert(1)",
            "vbscript:x",
            "mailto:a@b.com",
            "gopher://example.com/",
            "file:///definitely/missing.html",
        ] {
            let outcome = gate.decide(request(raw, NavigationTrigger::Typed, true));
            assert_eq!(outcome.decision, NavigationDecision::Allow, "{raw}");
            assert!(outcome.audit.success);
        }
    }

    #[test]
    fn every_decision_writes_exactly_one_entry() {
        let mut gate = gate();
        gate.decide(sub_frame_link("https://example.com/"));
        gate.decide(sub_frame_link("javascript:alert(1)"));
        gate.decide(request("https://example.com/", NavigationTrigger::Reload, true));
        assert_eq!(gate.audit_log().len(), 3);

        let stats = gate.stats();
        assert_eq!(stats.total_navigations, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.success_rate, 66.67);
        assert_eq!(stats.suspicious_attempts, 1);
    }

    #[test]
    fn suspicious_counter_survives_log_eviction() {
        let mut config = GateConfig::default();
        config.audit_capacity = 2;
        let mut gate =
            NavigationGate::with_parts(config, MemoryFileSystem::default(), CmarkConverter::default())
                .unwrap_or_else(|error| panic!("{error}"));

        for _ in 0..5 {
            gate.decide(sub_frame_link("javascript:void(0)"));
        }

        assert_eq!(gate.audit_log().len(), 2);
        assert_eq!(gate.stats().suspicious_attempts, 5);
    }

    #[test]
    fn long_url_is_flagged_but_still_allowed() {
        let mut gate = gate();
        let raw = format!("https://example.com/{}", "a".repeat(2100));
        let outcome = gate.decide(sub_frame_link(&raw));

        assert_eq!(outcome.decision, NavigationDecision::Allow);
        assert!(outcome.verdict.reasons.iter().any(|item| item.contains("long")));
        assert_eq!(gate.suspicious_attempts(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn markdown_main_frame_queues_one_substitution() {
        let fs = MemoryFileSystem::default().with_file("/docs/readme.md", "# Read Me\n\n[next](other.md)\n");
        let mut gate = gate_with(fs);

        let outcome = gate.decide(request("file:///docs/readme.md", NavigationTrigger::Typed, true));
        assert_eq!(outcome.decision, NavigationDecision::Allow);
        assert!(gate.has_pending_substitution());
        assert_eq!(gate.current_document_dir(), Some(Path::new("/docs")));

        let document = gate.on_load_finished(true);
        let document = document.unwrap_or_else(|| panic!("expected substitution"));
        assert_eq!(document.title, "Read Me");
        assert!(document.html.contains("spidy-md://open?target=other.md"));

        gate.decide(request("https://example.com/", NavigationTrigger::LinkClicked, true));
        assert_eq!(gate.on_load_finished(true), None);
        assert_eq!(gate.on_load_finished(true), None);
    }

    #[cfg(unix)]
    #[test]
    fn failed_load_discards_substitution() {
        let fs = MemoryFileSystem::default().with_file("/docs/readme.md", "# Hi\n");
        let mut gate = gate_with(fs);

        gate.decide(request("file:///docs/readme.md", NavigationTrigger::Typed, true));
        assert_eq!(gate.on_load_finished(false), None);
        assert!(!gate.has_pending_substitution());
        assert_eq!(gate.on_load_finished(true), None);
    }

    #[cfg(unix)]
    #[test]
    fn superseded_markdown_navigation_drops_substitution() {
        let fs = MemoryFileSystem::default().with_file("/docs/readme.md", "# Hi\n");
        let mut gate = gate_with(fs);

        gate.decide(request("file:///docs/readme.md", NavigationTrigger::Typed, true));
        gate.decide(request("https://example.com/", NavigationTrigger::Typed, true));
        assert!(!gate.has_pending_substitution());
        assert_eq!(gate.current_document_dir(), None);
    }

    #[cfg(unix)]
    #[test]
    fn conversion_failure_falls_through_to_plain_allow() {
        let fs = MemoryFileSystem::default().with_file("/docs/readme.md", "# Hi\n");
        let mut gate = NavigationGate::with_parts(GateConfig::default(), fs, FailingConverter)
            .unwrap_or_else(|error| panic!("{error}"));

        let outcome = gate.decide(request("file:///docs/readme.md", NavigationTrigger::Typed, true));
        assert_eq!(outcome.decision, NavigationDecision::Allow);
        assert!(outcome.audit.success);
        assert!(!gate.has_pending_substitution());
        assert_eq!(gate.current_document_dir(), Some(Path::new("/docs")));
    }

    #[test]
    fn missing_markdown_file_is_a_plain_main_frame_allow() {
        let mut gate = gate();
        let outcome = gate.decide(request("file:///docs/absent.md", NavigationTrigger::Typed, true));
        assert_eq!(outcome.decision, NavigationDecision::Allow);
        assert!(!gate.has_pending_substitution());
    }

    #[test]
    fn markdown_special_case_is_main_frame_only() {
        let fs = MemoryFileSystem::default().with_file("/docs/readme.md", "# Hi\n");
        let mut gate = gate_with(fs);
        gate.decide(sub_frame_link("file:///docs/readme.md"));
        assert!(!gate.has_pending_substitution());
    }

    #[cfg(unix)]
    #[test]
    fn markdown_link_redirects_into_markdown_flow() {
        let fs = MemoryFileSystem::default()
            .with_file("/docs/readme.md", "# Read Me\n\n[next](other.md)\n")
            .with_file("/docs/other.md", "# Other\n");
        let mut gate = gate_with(fs);

        gate.decide(request("file:///docs/readme.md", NavigationTrigger::Typed, true));
        assert!(gate.on_load_finished(true).is_some());

        let outcome = gate.navigate(request(
            "spidy-md://open?target=other.md",
            NavigationTrigger::LinkClicked,
            true,
        ));

        assert_eq!(outcome.decision, NavigationDecision::Allow);
        assert_eq!(outcome.audit.url, "file:///docs/other.md");
        assert_eq!(outcome.audit.trigger_kind, NavigationTrigger::Redirect);
        assert_eq!(
            outcome.redirected_from,
            vec!["spidy-md://open?target=other.md".to_owned()]
        );

        let document = gate.on_load_finished(true);
        assert_eq!(document.map(|doc| doc.title), Some("Other".to_owned()));
        assert_eq!(gate.audit_log().len(), 3);
    }

    #[test]
    fn decide_returns_redirect_without_following() {
        let mut gate = gate();
        let outcome = gate.decide(request(
            "spidy-md://open?target=%2Fdocs%2Fa.md",
            NavigationTrigger::LinkClicked,
            true,
        ));

        match &outcome.decision {
            NavigationDecision::Redirect { target } => {
                assert_eq!(target.as_str(), "file:///docs/a.md");
            }
            other => panic!("unexpected decision: {other:?}"),
        }
        assert!(outcome.audit.success);
        assert!(reason(&outcome).starts_with("Markdown link resolved to file:///docs/a.md"));
    }

    #[test]
    fn unresolvable_markdown_link_is_denied() {
        let mut gate = gate();
        let outcome = gate.navigate(sub_frame_link("spidy-md://open?target=other.md"));

        assert_eq!(outcome.decision, NavigationDecision::Deny);
        assert!(!outcome.audit.success);
        assert!(reason(&outcome).starts_with("Markdown link could not be resolved"));
        assert!(outcome.redirected_from.is_empty());
    }

    #[test]
    fn redirect_hops_are_bounded() {
        let mut config = GateConfig::default();
        config.max_redirect_hops = 0;
        let mut gate =
            NavigationGate::with_parts(config, MemoryFileSystem::default(), CmarkConverter::default())
                .unwrap_or_else(|error| panic!("{error}"));

        let outcome = gate.navigate(request(
            "spidy-md://open?target=%2Fdocs%2Fa.md",
            NavigationTrigger::LinkClicked,
            true,
        ));

        assert_eq!(outcome.decision, NavigationDecision::Deny);
        assert_eq!(reason(&outcome), "Redirect limit exceeded");
        assert_eq!(outcome.audit.url, "file:///docs/a.md");
        assert_eq!(outcome.redirected_from.len(), 1);
        assert_eq!(gate.audit_log().len(), 2);
    }

    #[test]
    fn refused_redirect_still_counts_suspicious_target() {
        let mut config = GateConfig::default();
        config.max_redirect_hops = 0;
        let mut gate =
            NavigationGate::with_parts(config, MemoryFileSystem::default(), CmarkConverter::default())
                .unwrap_or_else(|error| panic!("{error}"));

        let outcome = gate.navigate(request(
            "spidy-md://open?target=%2Fdocs%2Fa%2500.md",
            NavigationTrigger::LinkClicked,
            true,
        ));

        assert_eq!(outcome.decision, NavigationDecision::Deny);
        assert_eq!(reason(&outcome), "Redirect limit exceeded");
        assert!(outcome.verdict.is_suspicious);
        assert_eq!(gate.suspicious_attempts(), 1);
        assert_eq!(gate.stats().suspicious_attempts, 1);
    }

    #[test]
    fn unresolvable_markdown_link_is_denied_in_main_frame() {
        let mut gate = gate();
        let outcome = gate.navigate(request(
            "spidy-md://open?target=other.md",
            NavigationTrigger::LinkClicked,
            true,
        ));

        assert_eq!(outcome.decision, NavigationDecision::Deny);
        assert!(reason(&outcome).contains("markdown.base_missing"));
        assert!(!gate.has_pending_substitution());
        assert_eq!(gate.current_document_dir(), None);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = GateConfig::default();
        config.audit_capacity = 0;
        let gate = NavigationGate::new(config);
        assert!(gate.is_err_and(|error| error.code == "config.audit_capacity_invalid"));
    }

    #[test]
    fn real_filesystem_markdown_round_trip() {
        let dir = tempfile::tempdir().unwrap_or_else(|error| panic!("{error}"));
        let readme = dir.path().join("readme.md");
        assert!(std::fs::write(&readme, "# Intro\n\nSee [guide](guide.md).\n").is_ok());
        assert!(std::fs::write(dir.path().join("guide.md"), "# Guide\n").is_ok());

        let mut gate = NavigationGate::new(GateConfig::default()).unwrap_or_else(|error| panic!("{error}"));
        let url = sp_url::NavUrl::from_file_path(&readme).unwrap_or_else(|error| panic!("{error}"));
        let outcome = gate.navigate(NavigationRequest::new(url, NavigationTrigger::Typed, true));
        assert!(outcome.decision.is_allowed());

        let document = gate.on_load_finished(true).unwrap_or_else(|| panic!("no document"));
        assert_eq!(document.title, "Intro");

        let followed = gate.navigate(request(
            "spidy-md://open?target=guide.md",
            NavigationTrigger::LinkClicked,
            true,
        ));
        assert!(followed.decision.is_allowed());
        assert_eq!(gate.on_load_finished(true).map(|doc| doc.title), Some("Guide".to_owned()));
    }
}
