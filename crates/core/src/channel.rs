use std::fmt;

const RISKS: [&str; 4] = ["stable", "candidate", "beta", "edge"];

/// A parsed channel request: `risk`, `track/risk`, `risk/branch` or
/// `track/risk/branch`. A bare risk lives on the `latest` track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelName {
    pub track: String,
    pub risk: String,
    pub branch: Option<String>,
}

impl ChannelName {
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        let is_risk = |p: &str| RISKS.contains(&p);
        let (track, risk, branch) = match parts.as_slice() {
            [risk] if is_risk(risk) => ("latest", *risk, None),
            [track] => (*track, "stable", None),
            [risk, branch] if is_risk(risk) => ("latest", *risk, Some(*branch)),
            [track, risk] if is_risk(risk) => (*track, *risk, None),
            [track, risk, branch] if is_risk(risk) => (*track, *risk, Some(*branch)),
            _ => return None,
        };
        Some(Self {
            track: track.to_string(),
            risk: risk.to_string(),
            branch: branch.map(str::to_string),
        })
    }

    pub fn stable() -> Self {
        Self {
            track: "latest".into(),
            risk: "stable".into(),
            branch: None,
        }
    }

    /// Risk plus branch, the short form stored in a snap's `channel` field.
    pub fn short(&self) -> String {
        match &self.branch {
            Some(b) => format!("{}/{b}", self.risk),
            None => self.risk.clone(),
        }
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.track, self.risk)?;
        if let Some(branch) = &self.branch {
            write!(f, "/{branch}")?;
        }
        Ok(())
    }
}
