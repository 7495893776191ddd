//! Reference case layout.
//!
//! The reference root holds one directory per group, each holding case
//! directories:
//!
//! ```text
//! <root>/<group>/<case>static/
//!     trace_dir/
//!     traincheck_onlinecheck_<stamp>.log
//!     traincheck_onlinechecker_<stamp>/invariants.json
//!     traincheck_checker_<stamp>/invariants.json
//!     traincheck_checker_<stamp>/trace_dir/failed.log
//! <root>/<group>/<case>simulated/
//!     ...
//! ```
//!
//! Every prefix and file name comes from [`CaseLayout`].

use regress_core::{CaseLayout, CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// What a case is checked with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    /// Online checker reading the recorded trace directly
    OnlineStatic,
    /// Online checker reading a time-faithful replay of the trace
    OnlineSimulated,
    /// Offline checker reading the complete trace
    Offline,
}

impl std::fmt::Display for CaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OnlineStatic => write!(f, "online-static"),
            Self::OnlineSimulated => write!(f, "online-simulated"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Case directories found under a reference root, each list sorted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredCases {
    /// Directories whose name ends with the static suffix
    pub static_cases: Vec<PathBuf>,
    /// Directories whose name ends with the simulated suffix
    pub simulated_cases: Vec<PathBuf>,
}

impl DiscoveredCases {
    /// Cases in execution order: online static, online simulated, offline.
    ///
    /// Static cases are checked offline as well, except those whose path
    /// contains the skip marker.
    #[must_use]
    pub fn plan(&self, layout: &CaseLayout) -> Vec<(CaseKind, PathBuf)> {
        let online_static = self
            .static_cases
            .iter()
            .map(|dir| (CaseKind::OnlineStatic, dir.clone()));
        let online_simulated = self
            .simulated_cases
            .iter()
            .map(|dir| (CaseKind::OnlineSimulated, dir.clone()));
        let offline = self
            .static_cases
            .iter()
            .filter(|dir| !dir.to_string_lossy().contains(&layout.offline_skip_marker))
            .map(|dir| (CaseKind::Offline, dir.clone()));

        online_static.chain(online_simulated).chain(offline).collect()
    }

    /// Whether nothing was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.static_cases.is_empty() && self.simulated_cases.is_empty()
    }
}

/// Artifacts a case provides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseComponents {
    /// Recorded trace (directory or file)
    pub trace: PathBuf,
    /// Reference result log
    pub reference: PathBuf,
    /// Invariant specification given to the checker
    pub spec: PathBuf,
}

fn sorted_entries(dir: &Path) -> CoreResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| CoreError::io(dir, &e))?;
    let mut paths = entries
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CoreError::io(dir, &e))?;
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Walk `<root>/<group>/<case>` and collect static and simulated cases
///
/// # Errors
///
/// Returns [`CoreError::Io`] if the root or a group directory cannot be listed
pub fn discover_cases(root: &Path, layout: &CaseLayout) -> CoreResult<DiscoveredCases> {
    let mut found = DiscoveredCases::default();

    for group in sorted_entries(root)? {
        if !group.is_dir() {
            continue;
        }
        for case in sorted_entries(&group)? {
            if !case.is_dir() {
                continue;
            }
            let name = file_name(&case);
            if name.ends_with(&layout.static_suffix) {
                found.static_cases.push(case);
            } else if name.ends_with(&layout.simulated_suffix) {
                found.simulated_cases.push(case);
            }
        }
    }

    tracing::info!(
        root = %root.display(),
        static_cases = found.static_cases.len(),
        simulated_cases = found.simulated_cases.len(),
        "discovered reference cases"
    );
    Ok(found)
}

/// Locate the artifacts a case needs for `kind`.
///
/// Nothing is run; a case missing any artifact is rejected here, before a
/// checker is started.
///
/// # Errors
///
/// Returns [`CoreError::MissingComponents`] naming every missing artifact,
/// or [`CoreError::Io`] if the case directory cannot be listed
pub fn resolve_components(case_dir: &Path, kind: CaseKind, layout: &CaseLayout) -> CoreResult<CaseComponents> {
    let entries = sorted_entries(case_dir)?;
    let trace = entries
        .iter()
        .find(|p| file_name(p).starts_with(&layout.trace_prefix))
        .cloned();

    let (reference, spec, expected) = match kind {
        CaseKind::OnlineStatic | CaseKind::OnlineSimulated => {
            let reference = entries
                .iter()
                .find(|p| {
                    p.is_file()
                        && file_name(p).starts_with(&layout.online_reference_prefix)
                        && p.extension().is_some_and(|ext| ext == layout.online_reference_extension.as_str())
                })
                .cloned();
            let spec = entries
                .iter()
                .filter(|p| p.is_dir() && file_name(p).starts_with(&layout.online_spec_dir_prefix))
                .map(|dir| dir.join(&layout.invariant_file_name))
                .find(|spec| spec.is_file());
            let expected = (
                format!("{}*.{}", layout.online_reference_prefix, layout.online_reference_extension),
                format!("{}*/{}", layout.online_spec_dir_prefix, layout.invariant_file_name),
            );
            (reference, spec, expected)
        }
        CaseKind::Offline => {
            let result_dirs: Vec<&PathBuf> = entries
                .iter()
                .filter(|p| p.is_dir() && file_name(p).starts_with(&layout.offline_spec_dir_prefix))
                .collect();
            let spec = result_dirs
                .iter()
                .map(|dir| dir.join(&layout.invariant_file_name))
                .find(|spec| spec.is_file());
            let reference = result_dirs
                .iter()
                .find_map(|dir| locate_failed_log(dir, layout).ok());
            let expected = (
                format!(
                    "{}*/{}*/{}",
                    layout.offline_spec_dir_prefix, layout.offline_result_dir_prefix, layout.failed_log_name
                ),
                format!("{}*/{}", layout.offline_spec_dir_prefix, layout.invariant_file_name),
            );
            (reference, spec, expected)
        }
    };

    match (trace, reference, spec) {
        (Some(trace), Some(reference), Some(spec)) => Ok(CaseComponents {
            trace,
            reference,
            spec,
        }),
        (trace, reference, spec) => {
            let mut missing = Vec::new();
            if trace.is_none() {
                missing.push(format!("{}*", layout.trace_prefix));
            }
            if reference.is_none() {
                missing.push(expected.0);
            }
            if spec.is_none() {
                missing.push(expected.1);
            }
            Err(CoreError::MissingComponents {
                case: case_dir.display().to_string(),
                missing,
            })
        }
    }
}

/// Find `<trace*>/failed.log` inside an offline result directory
///
/// # Errors
///
/// Returns [`CoreError::MissingOutput`] if no such log exists
pub fn locate_failed_log(result_dir: &Path, layout: &CaseLayout) -> CoreResult<PathBuf> {
    sorted_entries(result_dir)?
        .into_iter()
        .filter(|p| p.is_dir() && file_name(p).starts_with(&layout.offline_result_dir_prefix))
        .map(|dir| dir.join(&layout.failed_log_name))
        .find(|log| log.is_file())
        .ok_or_else(|| CoreError::MissingOutput {
            location: result_dir.display().to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn layout() -> CaseLayout {
        CaseLayout::default()
    }

    /// A complete case directory with both online and offline artifacts
    fn make_case(dir: &Path) {
        fs::create_dir_all(dir.join("trace_run")).unwrap();
        fs::write(dir.join("trace_run/trace_0.json"), "{\"time\": 1}\n").unwrap();
        fs::write(dir.join("traincheck_onlinecheck_001.log"), "Total 0 violations found\n").unwrap();
        fs::create_dir_all(dir.join("traincheck_onlinechecker_001")).unwrap();
        fs::write(dir.join("traincheck_onlinechecker_001/invariants.json"), "[]").unwrap();
        fs::create_dir_all(dir.join("traincheck_checker_001/trace_run")).unwrap();
        fs::write(dir.join("traincheck_checker_001/invariants.json"), "[]").unwrap();
        fs::write(dir.join("traincheck_checker_001/trace_run/failed.log"), "").unwrap();
    }

    #[test]
    fn test_discover_and_plan() {
        let root = tempfile::tempdir().unwrap();
        for case in [
            "g1/a_static",
            "g1/b_simulated",
            "g2/c_modified_static",
            "g2/notes",
        ] {
            fs::create_dir_all(root.path().join(case)).unwrap();
        }
        fs::write(root.path().join("g1/d_static"), "").unwrap();
        fs::write(root.path().join("README"), "").unwrap();

        let cases = discover_cases(root.path(), &layout()).unwrap();
        assert_eq!(
            cases.static_cases,
            vec![root.path().join("g1/a_static"), root.path().join("g2/c_modified_static")]
        );
        assert_eq!(cases.simulated_cases, vec![root.path().join("g1/b_simulated")]);

        let plan = cases.plan(&layout());
        let kinds: Vec<_> = plan.iter().map(|(k, d)| (*k, file_name(d))).collect();
        assert_eq!(
            kinds,
            vec![
                (CaseKind::OnlineStatic, "a_static".to_string()),
                (CaseKind::OnlineStatic, "c_modified_static".to_string()),
                (CaseKind::OnlineSimulated, "b_simulated".to_string()),
                (CaseKind::Offline, "a_static".to_string()),
            ]
        );
    }

    #[test]
    fn test_discover_missing_root() {
        assert!(matches!(
            discover_cases(Path::new("/nonexistent/reference_result"), &layout()),
            Err(CoreError::Io { .. })
        ));
    }

    #[test]
    fn test_resolve_online_components() {
        let dir = tempfile::tempdir().unwrap();
        make_case(dir.path());

        let components = resolve_components(dir.path(), CaseKind::OnlineStatic, &layout()).unwrap();
        assert_eq!(components.trace, dir.path().join("trace_run"));
        assert_eq!(components.reference, dir.path().join("traincheck_onlinecheck_001.log"));
        assert_eq!(
            components.spec,
            dir.path().join("traincheck_onlinechecker_001/invariants.json")
        );
    }

    #[test]
    fn test_resolve_offline_components() {
        let dir = tempfile::tempdir().unwrap();
        make_case(dir.path());

        let components = resolve_components(dir.path(), CaseKind::Offline, &layout()).unwrap();
        assert_eq!(components.trace, dir.path().join("trace_run"));
        assert_eq!(
            components.reference,
            dir.path().join("traincheck_checker_001/trace_run/failed.log")
        );
        assert_eq!(components.spec, dir.path().join("traincheck_checker_001/invariants.json"));
    }

    #[test]
    fn test_missing_spec_is_named() {
        let dir = tempfile::tempdir().unwrap();
        make_case(dir.path());
        fs::remove_file(dir.path().join("traincheck_onlinechecker_001/invariants.json")).unwrap();

        let err = resolve_components(dir.path(), CaseKind::OnlineSimulated, &layout()).unwrap_err();
        match err {
            CoreError::MissingComponents { missing, .. } => {
                assert_eq!(missing, vec!["traincheck_onlinechecker*/invariants.json".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_empty_case_lists_everything() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_components(dir.path(), CaseKind::Offline, &layout()).unwrap_err();
        assert!(matches!(err, CoreError::MissingComponents { ref missing, .. } if missing.len() == 3));
        assert!(err.to_string().contains("trace*"));
    }

    #[test]
    fn test_locate_failed_log() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("trace_a")).unwrap();
        fs::create_dir_all(dir.path().join("trace_b")).unwrap();
        fs::write(dir.path().join("trace_b/failed.log"), "").unwrap();

        assert_eq!(
            locate_failed_log(dir.path(), &layout()).unwrap(),
            dir.path().join("trace_b/failed.log")
        );

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            locate_failed_log(empty.path(), &layout()),
            Err(CoreError::MissingOutput { .. })
        ));
    }
}
