//! Edition selection and the per-edition data table.
use serde::Serialize;
use std::fmt;

/// Deployment variant chosen once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Edition {
    OpenSource,
    Enterprise,
}

/// Package produced by the relocated installer and recorded by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredArtifact {
    pub key: &'static str,
    pub dir_rel: &'static str,
    pub pattern: &'static str,
}

/// Everything that differs between editions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditionProfile {
    pub compose_target_rel: &'static str,
    pub master_data_target_rel: &'static str,
    pub requires_bundle: bool,
    pub requires_secrets: bool,
    pub artifacts: &'static [RequiredArtifact],
}

const ENTERPRISE_ARTIFACTS: [RequiredArtifact; 2] = [
    RequiredArtifact {
        key: "RAAS_RPM_NAME",
        dir_rel: "build/raas/eapi_service/files",
        pattern: "raas*.rpm",
    },
    RequiredArtifact {
        key: "MASTER_PLUGIN_NAME",
        dir_rel: "build/salt-master/eapi_plugin/files",
        pattern: "SSEAPE*.whl",
    },
];

const OPEN_SOURCE_PROFILE: EditionProfile = EditionProfile {
    compose_target_rel: "oss-compose.yaml",
    master_data_target_rel: "data/oss-master",
    requires_bundle: false,
    requires_secrets: false,
    artifacts: &[],
};

const ENTERPRISE_PROFILE: EditionProfile = EditionProfile {
    compose_target_rel: "aria-compose.yaml",
    master_data_target_rel: "data/ent-master",
    requires_bundle: true,
    requires_secrets: true,
    artifacts: &ENTERPRISE_ARTIFACTS,
};

impl Edition {
    pub fn profile(self) -> &'static EditionProfile {
        match self {
            Edition::OpenSource => &OPEN_SOURCE_PROFILE,
            Edition::Enterprise => &ENTERPRISE_PROFILE,
        }
    }

    /// The edition that is not `self`.
    pub fn other(self) -> Edition {
        match self {
            Edition::OpenSource => Edition::Enterprise,
            Edition::Enterprise => Edition::OpenSource,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Edition::OpenSource => "oss",
            Edition::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
