//! 发布/订阅别名表
//!
//! 每个槽位的别名（alias）在配置时固定，用户只能修改绑定名（bound name）。
//! 槽位按下标寻址，删除只清空绑定名，不压缩列表，下标在整个会话内保持稳定。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasKind {
    Publication,
    Subscription,
}

impl AliasKind {
    pub fn label(self) -> &'static str {
        match self {
            AliasKind::Publication => "Publication",
            AliasKind::Subscription => "Subscription",
        }
    }

    /// 列表页路径
    pub fn list_path(self) -> &'static str {
        match self {
            AliasKind::Publication => "/publication",
            AliasKind::Subscription => "/subscription",
        }
    }

    /// 增删表单提交路径
    pub fn modify_path(self) -> &'static str {
        match self {
            AliasKind::Publication => "/modifypublication",
            AliasKind::Subscription => "/modifysubscription",
        }
    }
}

impl std::fmt::Display for AliasKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasError {
    /// 所有槽位都已绑定
    CapacityExceeded { kind: AliasKind, capacity: usize },
    /// 没有槽位绑定了该名称
    NotFound { kind: AliasKind, name: String },
    /// 名称已绑定在某个槽位上
    AlreadyBound { kind: AliasKind, index: usize },
    /// 下标越界或槽位未绑定
    IndexOutOfRange {
        kind: AliasKind,
        index: usize,
        capacity: usize,
    },
    /// 绑定名为空
    EmptyName,
    /// 配置中的别名为空
    EmptyAlias { kind: AliasKind, index: usize },
    /// 配置中同一绑定名出现在多个槽位
    DuplicateBinding { kind: AliasKind, index: usize },
}

impl std::fmt::Display for AliasError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AliasError::CapacityExceeded { kind, capacity } => {
                write!(f, "{} list is full ({} slots)", kind, capacity)
            }
            AliasError::NotFound { kind, name } => {
                write!(f, "no {} bound to {:?}", kind, name)
            }
            AliasError::AlreadyBound { kind, index } => {
                write!(f, "name already bound to {} slot {}", kind, index)
            }
            AliasError::IndexOutOfRange {
                kind,
                index,
                capacity,
            } => write!(
                f,
                "{} slot {} is not bound (capacity {})",
                kind, index, capacity
            ),
            AliasError::EmptyName => write!(f, "bound name must not be empty"),
            AliasError::EmptyAlias { kind, index } => {
                write!(f, "{} alias at slot {} is empty", kind, index)
            }
            AliasError::DuplicateBinding { kind, index } => {
                write!(f, "{} slot {} repeats an earlier bound name", kind, index)
            }
        }
    }
}

impl std::error::Error for AliasError {}

/// 一个别名槽位
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasEntry {
    alias: String,
    #[serde(default)]
    bound_name: String,
}

impl AliasEntry {
    /// 未绑定的槽位
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            bound_name: String::new(),
        }
    }

    pub fn bound(alias: impl Into<String>, bound_name: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            bound_name: bound_name.into(),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn bound_name(&self) -> &str {
        &self.bound_name
    }

    pub fn is_bound(&self) -> bool {
        !self.bound_name.is_empty()
    }
}

/// 固定容量的别名列表，容量等于构造时的槽位数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasList {
    kind: AliasKind,
    entries: Vec<AliasEntry>,
}

impl AliasList {
    pub fn new(kind: AliasKind, entries: Vec<AliasEntry>) -> Result<Self, AliasError> {
        if let Some(index) = entries.iter().position(|e| e.alias.is_empty()) {
            return Err(AliasError::EmptyAlias { kind, index });
        }
        for (index, entry) in entries.iter().enumerate().filter(|(_, e)| e.is_bound()) {
            if entries[..index]
                .iter()
                .any(|e| e.bound_name == entry.bound_name)
            {
                return Err(AliasError::DuplicateBinding { kind, index });
            }
        }
        Ok(Self { kind, entries })
    }

    pub fn kind(&self) -> AliasKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// 已绑定槽位数
    pub fn occupied(&self) -> usize {
        self.entries.iter().filter(|e| e.is_bound()).count()
    }

    pub fn get(&self, index: usize) -> Option<&AliasEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &AliasEntry)> {
        self.entries.iter().enumerate()
    }

    pub fn iter_occupied(&self) -> impl Iterator<Item = (usize, &AliasEntry)> {
        self.iter().filter(|(_, e)| e.is_bound())
    }

    pub fn position_of(&self, bound_name: &str) -> Option<usize> {
        if bound_name.is_empty() {
            return None;
        }
        self.entries.iter().position(|e| e.bound_name == bound_name)
    }

    fn check_name(&self, name: &str, skip: Option<usize>) -> Result<(), AliasError> {
        if name.is_empty() {
            return Err(AliasError::EmptyName);
        }
        match self.position_of(name) {
            Some(index) if Some(index) != skip => Err(AliasError::AlreadyBound {
                kind: self.kind,
                index,
            }),
            _ => Ok(()),
        }
    }

    fn add(&mut self, name: &str) -> Result<usize, AliasError> {
        self.check_name(name, None)?;
        let index = self
            .entries
            .iter()
            .position(|e| !e.is_bound())
            .ok_or(AliasError::CapacityExceeded {
                kind: self.kind,
                capacity: self.capacity(),
            })?;
        self.entries[index].bound_name = name.to_string();
        Ok(index)
    }

    fn remove(&mut self, name: &str) -> Result<usize, AliasError> {
        let index = self.position_of(name).ok_or_else(|| AliasError::NotFound {
            kind: self.kind,
            name: name.to_string(),
        })?;
        self.entries[index].bound_name.clear();
        Ok(index)
    }

    fn rename(&mut self, index: usize, name: &str) -> Result<(), AliasError> {
        let capacity = self.capacity();
        let kind = self.kind;
        match self.entries.get(index) {
            Some(entry) if entry.is_bound() => {}
            _ => {
                return Err(AliasError::IndexOutOfRange {
                    kind,
                    index,
                    capacity,
                })
            }
        }
        self.check_name(name, Some(index))?;
        self.entries[index].bound_name = name.to_string();
        Ok(())
    }
}

pub type NameObserver = Box<dyn FnMut(&str) + Send>;
pub type ChangeObserver = Box<dyn FnMut(usize, &str) + Send>;

#[derive(Default)]
struct Observers {
    on_add: Option<NameObserver>,
    on_remove: Option<NameObserver>,
    on_change: Option<ChangeObserver>,
}

/// 发布与订阅两张别名表，以及变更通知回调
pub struct AliasRegistry {
    publications: AliasList,
    subscriptions: AliasList,
    publication_observers: Observers,
    subscription_observers: Observers,
}

impl AliasRegistry {
    pub fn new(
        publications: Vec<AliasEntry>,
        subscriptions: Vec<AliasEntry>,
    ) -> Result<Self, AliasError> {
        Ok(Self {
            publications: AliasList::new(AliasKind::Publication, publications)?,
            subscriptions: AliasList::new(AliasKind::Subscription, subscriptions)?,
            publication_observers: Observers::default(),
            subscription_observers: Observers::default(),
        })
    }

    /// 没有任何槽位的空表
    pub fn empty() -> Self {
        Self {
            publications: AliasList {
                kind: AliasKind::Publication,
                entries: Vec::new(),
            },
            subscriptions: AliasList {
                kind: AliasKind::Subscription,
                entries: Vec::new(),
            },
            publication_observers: Observers::default(),
            subscription_observers: Observers::default(),
        }
    }

    pub fn list(&self, kind: AliasKind) -> &AliasList {
        match kind {
            AliasKind::Publication => &self.publications,
            AliasKind::Subscription => &self.subscriptions,
        }
    }

    pub fn on_add(&mut self, kind: AliasKind, f: impl FnMut(&str) + Send + 'static) {
        self.observers_mut(kind).on_add = Some(Box::new(f));
    }

    pub fn on_remove(&mut self, kind: AliasKind, f: impl FnMut(&str) + Send + 'static) {
        self.observers_mut(kind).on_remove = Some(Box::new(f));
    }

    /// 重命名回调，参数为 (下标, 新绑定名)
    pub fn on_change(&mut self, kind: AliasKind, f: impl FnMut(usize, &str) + Send + 'static) {
        self.observers_mut(kind).on_change = Some(Box::new(f));
    }

    pub fn add_binding(&mut self, kind: AliasKind, name: &str) -> Result<usize, AliasError> {
        let index = self.list_mut(kind).add(name)?;
        log::info!("{} slot {} bound to {:?}", kind, index, name);
        if let Some(f) = self.observers_mut(kind).on_add.as_mut() {
            f(name);
        }
        Ok(index)
    }

    pub fn remove_binding(&mut self, kind: AliasKind, name: &str) -> Result<usize, AliasError> {
        let index = self.list_mut(kind).remove(name)?;
        log::info!("{} slot {} unbound from {:?}", kind, index, name);
        if let Some(f) = self.observers_mut(kind).on_remove.as_mut() {
            f(name);
        }
        Ok(index)
    }

    pub fn rename(&mut self, kind: AliasKind, index: usize, name: &str) -> Result<(), AliasError> {
        self.list_mut(kind).rename(index, name)?;
        log::info!("{} slot {} renamed to {:?}", kind, index, name);
        if let Some(f) = self.observers_mut(kind).on_change.as_mut() {
            f(index, name);
        }
        Ok(())
    }

    fn list_mut(&mut self, kind: AliasKind) -> &mut AliasList {
        match kind {
            AliasKind::Publication => &mut self.publications,
            AliasKind::Subscription => &mut self.subscriptions,
        }
    }

    fn observers_mut(&mut self, kind: AliasKind) -> &mut Observers {
        match kind {
            AliasKind::Publication => &mut self.publication_observers,
            AliasKind::Subscription => &mut self.subscription_observers,
        }
    }
}
