//! Evidence bundle handed to the decision policy

use crate::models::PodEvent;
use std::fmt;

/// Identity and fixed position of each evidence section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    DeploymentReplicas,
    CpuUsage,
    MemoryUsage,
    NodeAvailableMemory,
    IngressRequestRate,
    ResourceSpec,
    PodEvents,
}

impl SectionKind {
    /// All sections in rendering order
    pub const ORDER: [SectionKind; 7] = [
        SectionKind::DeploymentReplicas,
        SectionKind::CpuUsage,
        SectionKind::MemoryUsage,
        SectionKind::NodeAvailableMemory,
        SectionKind::IngressRequestRate,
        SectionKind::ResourceSpec,
        SectionKind::PodEvents,
    ];

    /// Sections backed by a monitoring query
    pub const METRICS: [SectionKind; 5] = [
        SectionKind::DeploymentReplicas,
        SectionKind::CpuUsage,
        SectionKind::MemoryUsage,
        SectionKind::NodeAvailableMemory,
        SectionKind::IngressRequestRate,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SectionKind::DeploymentReplicas => "Deployment replicas",
            SectionKind::CpuUsage => "CPU usage",
            SectionKind::MemoryUsage => "Memory usage",
            SectionKind::NodeAvailableMemory => "Node available memory",
            SectionKind::IngressRequestRate => "Ingress request rate",
            SectionKind::ResourceSpec => "Resource spec",
            SectionKind::PodEvents => "Pod events",
        }
    }

    fn position(&self) -> usize {
        Self::ORDER.iter().position(|k| k == self).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One labeled section of evidence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvidenceSection {
    pub kind: SectionKind,
    /// Query expression, for sections backed by the monitoring backend
    pub query: Option<String>,
    pub text: String,
    /// True when the text is a placeholder for a failed query
    pub degraded: bool,
}

impl EvidenceSection {
    /// A metric section holding a backend response body
    pub fn metric(kind: SectionKind, query: impl Into<String>, body: &str) -> Self {
        Self {
            kind,
            query: Some(query.into()),
            text: strip_escapes(body),
            degraded: false,
        }
    }

    /// A metric section whose query failed
    pub fn unavailable(kind: SectionKind, query: impl Into<String>, reason: &str) -> Self {
        Self {
            kind,
            query: Some(query.into()),
            text: format!("unavailable: {}", strip_escapes(reason)),
            degraded: true,
        }
    }

    /// A section with no backing query
    pub fn verbatim(kind: SectionKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            query: None,
            text: text.into(),
            degraded: false,
        }
    }

    pub fn render(&self) -> String {
        match &self.query {
            Some(query) => format!("{} - query: {} result: {}", self.kind, query, self.text),
            None => format!("{}: {}", self.kind, self.text),
        }
    }
}

/// Ordered set of evidence sections, rebuilt on every pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceBundle {
    sections: Vec<EvidenceSection>,
}

impl EvidenceBundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a section at its fixed position, replacing any previous one of the same kind
    pub fn push(&mut self, section: EvidenceSection) {
        self.sections.retain(|s| s.kind != section.kind);
        let at = self
            .sections
            .iter()
            .position(|s| s.kind.position() > section.kind.position())
            .unwrap_or(self.sections.len());
        self.sections.insert(at, section);
    }

    pub fn get(&self, kind: SectionKind) -> Option<&EvidenceSection> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn sections(&self) -> &[EvidenceSection] {
        &self.sections
    }

    pub fn degraded_count(&self) -> usize {
        self.sections.iter().filter(|s| s.degraded).count()
    }

    /// Textual form sent to the decision service
    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(EvidenceSection::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Remove literal backslashes; the bundle is escaped again for transport
pub fn strip_escapes(text: &str) -> String {
    text.replace('\\', "")
}

/// One line per event
pub fn flatten_events(events: &[PodEvent]) -> String {
    if events.is_empty() {
        return "none".to_string();
    }
    events
        .iter()
        .map(|e| {
            format!(
                "pod={} type={} reason={} message={}",
                e.pod,
                e.event_type,
                e.reason,
                strip_escapes(&e.message)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
