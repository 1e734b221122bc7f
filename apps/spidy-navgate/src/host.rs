use serde::Serialize;
use sp_core::NavigationTrigger;
use sp_core::SpidyResult;
use sp_navigation::FileSystem;
use sp_navigation::NavigationAuditEntry;
use sp_navigation::NavigationDecision;
use sp_navigation::NavigationGate;
use sp_navigation::NavigationOutcome;
use sp_navigation::NavigationRequest;
use sp_navigation::NavigationStats;
use sp_navigation::markdown::MarkdownConverter;

/// Rendered Markdown swapped into the view after the load completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Substitution {
    pub title: String,
    pub source_path: String,
    pub bytes: usize,
}

/// Result of one navigation as the host saw it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HostReport {
    pub outcome: NavigationOutcome,
    pub substitution: Option<Substitution>,
}

#[derive(Serialize)]
struct DecisionRecord<'a> {
    decision: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fallback: Option<&'a str>,
    #[serde(skip_serializing_if = "no_redirects")]
    redirected_from: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    substitution: Option<&'a Substitution>,
    audit: &'a NavigationAuditEntry,
}

fn no_redirects(urls: &&[String]) -> bool {
    urls.is_empty()
}

/// Stand-in for the rendering engine: submits navigations to the gate and
/// fires the load-completion hook for every allowed main-frame load.
pub(crate) struct EngineHost<F, C> {
    gate: NavigationGate<F, C>,
    trigger: NavigationTrigger,
    main_frame: bool,
}

impl<F: FileSystem, C: MarkdownConverter> EngineHost<F, C> {
    pub fn new(gate: NavigationGate<F, C>, trigger: NavigationTrigger, main_frame: bool) -> Self {
        Self {
            gate,
            trigger,
            main_frame,
        }
    }

    pub fn submit(&mut self, raw_url: &str) -> SpidyResult<HostReport> {
        let request = NavigationRequest::parse(raw_url, self.trigger, self.main_frame)?;
        let outcome = self.gate.navigate(request);

        let substitution = if outcome.decision.is_allowed() && self.main_frame {
            self.gate
                .on_load_finished(true)
                .map(|document| Substitution {
                    bytes: document.html.len(),
                    source_path: document.source_path.display().to_string(),
                    title: document.title,
                })
        } else {
            None
        };

        Ok(HostReport {
            outcome,
            substitution,
        })
    }

    pub fn stats(&self) -> NavigationStats {
        self.gate.stats()
    }
}

pub(crate) fn format_text(report: &HostReport) -> String {
    let outcome = &report.outcome;
    let mut line = match &outcome.decision {
        NavigationDecision::Redirect { target } => format!("REDIRECT {} -> {target}", outcome.audit.url),
        decision => format!("{} {}", decision.as_str().to_ascii_uppercase(), outcome.audit.url),
    };

    if !outcome.redirected_from.is_empty() {
        line.push_str(&format!(" (via {})", outcome.redirected_from.join(", ")));
    }
    if let Some(reason) = &outcome.audit.error_reason {
        line.push_str(&format!(" [{reason}]"));
    }
    if let Some(fallback) = &outcome.fallback {
        line.push_str(&format!(" fallback={fallback}"));
    }
    if !outcome.verdict.reasons.is_empty() {
        line.push_str(&format!(" suspicious: {}", outcome.verdict.reasons.join("; ")));
    }
    if let Some(substitution) = &report.substitution {
        line.push_str(&format!(
            " rendered \"{}\" ({} bytes)",
            substitution.title, substitution.bytes
        ));
    }
    line
}

pub(crate) fn format_json(report: &HostReport) -> serde_json::Result<String> {
    let outcome = &report.outcome;
    serde_json::to_string(&DecisionRecord {
        decision: outcome.decision.as_str(),
        fallback: outcome.fallback.as_ref().map(|url| url.as_str()),
        redirected_from: &outcome.redirected_from,
        substitution: report.substitution.as_ref(),
        audit: &outcome.audit,
    })
}

#[cfg(test)]
mod tests {
    use super::EngineHost;
    use super::format_json;
    use super::format_text;
    use sp_core::NavigationTrigger;
    use sp_navigation::GateConfig;
    use sp_navigation::NavigationDecision;
    use sp_navigation::NavigationGate;

    fn host(main_frame: bool) -> EngineHost<sp_navigation::StdFileSystem, sp_navigation::markdown::CmarkConverter> {
        let gate = NavigationGate::new(GateConfig::default()).unwrap_or_else(|error| panic!("{error}"));
        EngineHost::new(gate, NavigationTrigger::LinkClicked, main_frame)
    }

    #[test]
    fn formats_denied_script_link() {
        let mut host = host(false);
        let report = host
            .submit("javascript:alert(1)")
            .unwrap_or_else(|error| panic!("{error}"));

        assert_eq!(report.outcome.decision, NavigationDecision::Deny);
        let line = format_text(&report);
        assert!(line.starts_with("DENY javascript:alert(1) [Script scheme 'javascript' blocked]"));
        assert!(line.contains("suspicious: Suspicious scheme: javascript"));
    }

    #[test]
    fn json_record_carries_decision_and_audit() {
        let mut host = host(false);
        let report = host
            .submit("mailto:a@b.com")
            .unwrap_or_else(|error| panic!("{error}"));

        let encoded = format_json(&report).unwrap_or_else(|error| panic!("{error}"));
        let value: serde_json::Value =
            serde_json::from_str(&encoded).unwrap_or_else(|error| panic!("{error}"));
        assert_eq!(value["decision"], "deny");
        assert_eq!(value["audit"]["success"], true);
        assert_eq!(value["audit"]["error_reason"], "Handled by external application");
        assert!(value.get("fallback").is_none());
    }

    #[test]
    fn unparsable_url_is_an_error() {
        let mut host = host(false);
        assert!(host.submit("not a url").is_err_and(|error| error.code == "url.invalid"));
        assert_eq!(host.stats().total_navigations, 0);
    }

    #[test]
    fn main_frame_markdown_is_substituted_once() {
        let dir = tempfile::tempdir().unwrap_or_else(|error| panic!("{error}"));
        let readme = dir.path().join("readme.md");
        assert!(std::fs::write(&readme, "# Hello\n").is_ok());
        let url = sp_navigation::NavUrl::from_file_path(&readme).unwrap_or_else(|error| panic!("{error}"));

        let mut host = host(true);
        let report = host.submit(url.as_str()).unwrap_or_else(|error| panic!("{error}"));
        let substitution = report.substitution.clone().unwrap_or_else(|| panic!("no substitution"));
        assert_eq!(substitution.title, "Hello");
        assert!(format_text(&report).contains("rendered \"Hello\""));

        let next = host
            .submit("https://example.com/")
            .unwrap_or_else(|error| panic!("{error}"));
        assert_eq!(next.substitution, None);
        assert_eq!(host.stats().total_navigations, 2);
    }
}
