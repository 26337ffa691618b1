//! 目录树遍历
//!
//! 只依赖 [`CommandClient::get_directory`]。深度优先、同层按列表顺序；
//! 递归严格串行（同一会话只能有一个在途请求）。是否为目录只看名称是否以
//! `/` 结尾。任何一层出错都会中止整个遍历，不返回部分结果。
//!
//! 目录列表来自设备，不可信：空名、`.`、`..` 或含内部 `/` 的名称会让路径
//! 指回自身或上层，遇到即返回 [`Error::Protocol`]；递归深度也有上限。

use crate::error::{Error, Result};
use crate::pftp::client::CommandClient;
use crate::pftp::normalize_dir;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use log::debug;

/// 条目名称过滤器
pub type Accepts<'a> = &'a (dyn Fn(&str) -> bool + Send + Sync);

/// 遍历结果：完整路径和大小（目录的大小没有意义）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: String,
    pub size: u64,
}

/// 默认最大递归深度（相对遍历起点）
pub const DEFAULT_MAX_DEPTH: usize = 32;

pub struct TreeWalker<'a> {
    client: &'a CommandClient,
    max_depth: usize,
}

impl<'a> TreeWalker<'a> {
    pub fn new(client: &'a CommandClient) -> Self {
        Self {
            client,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// 超过该深度的子目录让遍历以 [`Error::Protocol`] 失败
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// 遍历 `root`。`recurse_deep` 为 false 时子目录作为普通结果返回。
    pub async fn walk(
        &self,
        root: &str,
        recurse_deep: bool,
        accepts: Accepts<'_>,
    ) -> Result<Vec<WalkEntry>> {
        let mut out = Vec::new();
        self.walk_level(normalize_dir(root), 0, recurse_deep, accepts, &mut out)
            .await?;
        Ok(out)
    }

    /// 只返回路径
    pub async fn paths(
        &self,
        root: &str,
        recurse_deep: bool,
        accepts: Accepts<'_>,
    ) -> Result<Vec<String>> {
        let entries = self.walk(root, recurse_deep, accepts).await?;
        Ok(entries.into_iter().map(|e| e.path).collect())
    }

    fn walk_level<'b>(
        &'b self,
        dir: String,
        depth: usize,
        recurse_deep: bool,
        accepts: Accepts<'b>,
        out: &'b mut Vec<WalkEntry>,
    ) -> BoxFuture<'b, Result<()>> {
        async move {
            if depth > self.max_depth {
                return Err(Error::Protocol(format!(
                    "{}: deeper than {} levels",
                    dir, self.max_depth
                )));
            }
            let listing = self.client.get_directory(&dir).await?;
            for entry in &listing.entries {
                check_entry_name(&dir, &entry.name)?;
            }
            let matched: Vec<_> = listing
                .entries
                .into_iter()
                .filter(|entry| accepts(&entry.name))
                .collect();
            if matched.is_empty() {
                debug!("{}: nothing matched, not descending", dir);
                return Ok(());
            }

            for entry in matched {
                let child = format!("{}{}", dir, entry.name);
                if recurse_deep && child.ends_with('/') {
                    self.walk_level(child, depth + 1, recurse_deep, accepts, out)
                        .await?;
                } else {
                    out.push(WalkEntry {
                        path: child,
                        size: entry.size,
                    });
                }
            }
            Ok(())
        }
        .boxed()
    }

    /// 仅当目录为空时删除，返回是否删除
    pub async fn delete_directory_if_empty(&self, path: &str) -> Result<bool> {
        let dir = normalize_dir(path);
        let entries = self.walk(&dir, false, &|_| true).await?;
        if !entries.is_empty() {
            debug!("{} has {} entries, keeping it", dir, entries.len());
            return Ok(false);
        }
        self.client.remove(&dir).await?;
        Ok(true)
    }
}

/// 条目名必须是单个路径段，目录名允许一个结尾 `/`
fn check_entry_name(dir: &str, name: &str) -> Result<()> {
    let segment = name.strip_suffix('/').unwrap_or(name);
    if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
        return Err(Error::Protocol(format!(
            "{}: invalid entry name {:?} in listing",
            dir, name
        )));
    }
    Ok(())
}
