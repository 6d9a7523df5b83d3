use std::fmt;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::network::state::NetworkState;
use crate::optim::{adam::AdamState, scheduler::SchedulerState};

/// Which snapshot a set of checkpoint files belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointId {
    /// Rolling snapshot, overwritten during an epoch.
    Latest,
    /// End of the given (1-based) epoch.
    Epoch(usize),
    /// Mid-epoch snapshot at a given iteration.
    EpochStep { epoch: usize, step: usize },
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointId::Latest => write!(f, "latest"),
            CheckpointId::Epoch(epoch) => write!(f, "epoch{epoch}"),
            CheckpointId::EpochStep { epoch, step } => write!(f, "epoch{epoch}step{step}"),
        }
    }
}

/// The three files that make up one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    Gen,
    Dis,
    Opt,
}

impl CheckpointKind {
    fn prefix(&self) -> &'static str {
        match self {
            CheckpointKind::Gen => "gen",
            CheckpointKind::Dis => "dis",
            CheckpointKind::Opt => "opt",
        }
    }

    fn from_prefix(prefix: &str) -> Option<CheckpointKind> {
        match prefix {
            "gen" => Some(CheckpointKind::Gen),
            "dis" => Some(CheckpointKind::Dis),
            "opt" => Some(CheckpointKind::Opt),
            _ => None,
        }
    }
}

impl CheckpointId {
    pub fn file_name(&self, kind: CheckpointKind) -> String {
        format!("{}_{}.json", kind.prefix(), self)
    }

    pub fn path(&self, dir: &Path, kind: CheckpointKind) -> PathBuf {
        dir.join(self.file_name(kind))
    }

    /// Parses names such as `gen_latest.json` or `opt_epoch3step200.json`.
    pub fn from_file_name(name: &str) -> Result<(CheckpointKind, CheckpointId)> {
        let unknown = || Error::UnknownCheckpoint(name.to_string());
        let stem = name.strip_suffix(".json").ok_or_else(unknown)?;
        let (prefix, tag) = stem.split_once('_').ok_or_else(unknown)?;
        let kind = CheckpointKind::from_prefix(prefix).ok_or_else(unknown)?;

        if tag == "latest" {
            return Ok((kind, CheckpointId::Latest));
        }
        let rest = tag.strip_prefix("epoch").ok_or_else(unknown)?;
        let id = match rest.split_once("step") {
            Some((epoch, step)) => CheckpointId::EpochStep {
                epoch: epoch.parse().map_err(|_| unknown())?,
                step: step.parse().map_err(|_| unknown())?,
            },
            None => CheckpointId::Epoch(rest.parse().map_err(|_| unknown())?),
        };
        Ok((kind, id))
    }

    /// Splits a checkpoint file path into its directory and id.
    pub fn locate(path: &Path) -> Result<(PathBuf, CheckpointId)> {
        let name = path.file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::UnknownCheckpoint(path.display().to_string()))?;
        let (_, id) = CheckpointId::from_file_name(name)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok((dir, id))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct GenFile {
    pub a: NetworkState,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct DisFile {
    pub dis: NetworkState,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct OptFile {
    pub gen: AdamState,
    pub gen_scheduler: SchedulerState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dis: Option<AdamState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dis_scheduler: Option<SchedulerState>,
}

/// Serializes `value` to a JSON file.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| Error::io(path, e))?;
    let writer = std::io::BufWriter::new(file);
    serde_json::to_writer(writer, value)
        .map_err(|source| Error::Json { path: path.to_path_buf(), source })
}

/// Deserializes a JSON file previously written by `write_json`.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = std::fs::File::open(path).map_err(|e| Error::io(path, e))?;
    let reader = std::io::BufReader::new(file);
    serde_json::from_reader(reader)
        .map_err(|source| Error::Json { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_encode_kind_and_id() {
        assert_eq!(CheckpointId::Latest.file_name(CheckpointKind::Gen), "gen_latest.json");
        assert_eq!(CheckpointId::Epoch(4).file_name(CheckpointKind::Opt), "opt_epoch4.json");
        assert_eq!(
            CheckpointId::EpochStep { epoch: 2, step: 150 }.file_name(CheckpointKind::Dis),
            "dis_epoch2step150.json"
        );
    }

    #[test]
    fn file_names_parse_back() {
        for id in [
            CheckpointId::Latest,
            CheckpointId::Epoch(12),
            CheckpointId::EpochStep { epoch: 3, step: 40 },
        ] {
            for kind in [CheckpointKind::Gen, CheckpointKind::Dis, CheckpointKind::Opt] {
                assert_eq!(CheckpointId::from_file_name(&id.file_name(kind)).unwrap(), (kind, id));
            }
        }
    }

    #[test]
    fn foreign_names_are_rejected() {
        for name in ["gen_latest.pt", "model_latest.json", "gen_epochX.json", "gen.json"] {
            assert!(matches!(CheckpointId::from_file_name(name), Err(Error::UnknownCheckpoint(_))));
        }
    }

    #[test]
    fn locate_splits_directory() {
        let (dir, id) = CheckpointId::locate(Path::new("runs/a/gen_epoch7.json")).unwrap();
        assert_eq!(dir, PathBuf::from("runs/a"));
        assert_eq!(id, CheckpointId::Epoch(7));
    }
}
