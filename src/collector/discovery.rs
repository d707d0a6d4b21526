use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// 主配置文件同级的覆盖目录名
pub const OVERRIDE_DIR: &str = "conf.d";

/// 一次采集周期内发现的配置文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub path: PathBuf,
    /// 最后修改时间（Unix 秒）
    pub modified: i64,
}

/// 主配置文件对应的覆盖目录
pub fn override_dir(primary: &Path) -> PathBuf {
    primary
        .parent()
        .unwrap_or_else(|| Path::new(""))
        .join(OVERRIDE_DIR)
}

/// 候选文件列表：主配置文件 + 覆盖目录下递归找到的所有非目录条目
///
/// 覆盖目录不存在或不可读是正常情况，此时只返回主配置文件。
pub fn candidate_paths(primary: &Path) -> Vec<PathBuf> {
    let mut paths = vec![primary.to_path_buf()];
    walk_files(&override_dir(primary), &mut paths);
    paths
}

/// 发现当前所有可用的配置文件
///
/// 无法 stat 或不是普通文件的候选项会被丢弃，不会导致整体失败。
pub fn discover(primary: &Path) -> Vec<ConfigFile> {
    candidate_paths(primary)
        .into_iter()
        .filter_map(|path| match stat_config_file(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!("Skipping config file {}: {}", path.display(), e);
                None
            }
        })
        .collect()
}

/// 读取单个候选文件的元数据
pub fn stat_config_file(path: &Path) -> std::io::Result<ConfigFile> {
    let metadata = fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }

    Ok(ConfigFile {
        path: path.to_path_buf(),
        modified: unix_seconds(metadata.modified()?),
    })
}

// 按字典序深度优先遍历，与常见的目录遍历顺序一致
fn walk_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Override directory {} not walked: {}", dir.display(), e);
            return;
        }
    };

    let mut entries: Vec<_> = entries.filter_map(Result::ok).collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        match entry.file_type() {
            Ok(file_type) if file_type.is_dir() => walk_files(&entry.path(), files),
            Ok(_) => files.push(entry.path()),
            Err(e) => debug!("Cannot inspect {}: {}", entry.path().display(), e),
        }
    }
}

fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}
