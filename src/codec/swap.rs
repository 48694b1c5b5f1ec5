//! Mapping-group substitution
//!
//! A mapping group pairs two equal-length character sequences. Swapping
//! exchanges `primary[i]` and `secondary[i]` in both directions, so applying
//! a group twice restores the input. Built-in groups move common multi-byte
//! characters (kana, frequent kanji) onto code points below U+0100, which
//! the compressor emits in fewer bits.
//!
//! Groups are validated once, when they are registered.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use thiserror::Error;
use tracing::debug;

use super::header::DELIMITER;

/// Longest allowed primary/secondary sequence
pub const MAX_GROUP_LEN: usize = 218;

/// Id of the always-present identity group
pub const IDENTITY_GROUP: u32 = 0;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("Group {id}: primary has {primary} characters but secondary has {secondary}")]
    LengthMismatch {
        id: u32,
        primary: usize,
        secondary: usize,
    },

    #[error("Group {id}: {len} characters exceeds the limit of {MAX_GROUP_LEN}")]
    TooLong { id: u32, len: usize },

    #[error("Group {id}: duplicate character {ch:?} in {side}")]
    DuplicateCharacter { id: u32, side: &'static str, ch: char },

    #[error("Group {id}: character {ch:?} appears in both sequences")]
    SharedCharacter { id: u32, ch: char },

    #[error("Group {id}: the header delimiter cannot be mapped")]
    ReservedCharacter { id: u32 },

    #[error("Group {0} is already registered")]
    DuplicateId(u32),

    #[error("Group {id}: {len} characters but only {pool} unused code points to pair them with")]
    PoolExhausted { id: u32, len: usize, pool: usize },
}

/// A validated pair of substitution sequences
#[derive(Debug, Clone)]
pub struct MappingGroup {
    id: u32,
    name: String,
    primary: Vec<char>,
    secondary: Vec<char>,
    table: HashMap<char, char>,
}

impl MappingGroup {
    /// Builds and validates a group
    pub fn new(
        id: u32,
        name: impl Into<String>,
        primary: impl IntoIterator<Item = char>,
        secondary: impl IntoIterator<Item = char>,
    ) -> Result<Self, RegistryError> {
        let primary: Vec<char> = primary.into_iter().collect();
        let secondary: Vec<char> = secondary.into_iter().collect();

        if primary.len() != secondary.len() {
            return Err(RegistryError::LengthMismatch {
                id,
                primary: primary.len(),
                secondary: secondary.len(),
            });
        }
        if primary.len() > MAX_GROUP_LEN {
            return Err(RegistryError::TooLong {
                id,
                len: primary.len(),
            });
        }

        check_unique(id, "primary", &primary)?;
        check_unique(id, "secondary", &secondary)?;

        let primary_set: HashSet<char> = primary.iter().copied().collect();
        if let Some(&ch) = secondary.iter().find(|c| primary_set.contains(c)) {
            return Err(RegistryError::SharedCharacter { id, ch });
        }
        if primary_set.contains(&DELIMITER) || secondary.contains(&DELIMITER) {
            return Err(RegistryError::ReservedCharacter { id });
        }

        let table = primary
            .iter()
            .zip(&secondary)
            .flat_map(|(&p, &s)| [(p, s), (s, p)])
            .collect();

        Ok(Self {
            id,
            name: name.into(),
            primary,
            secondary,
            table,
        })
    }

    /// The group that maps nothing
    pub fn identity() -> Self {
        Self {
            id: IDENTITY_GROUP,
            name: "identity".to_string(),
            primary: Vec::new(),
            secondary: Vec::new(),
            table: HashMap::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    /// Exchanges primary and secondary characters
    pub fn swap(&self, text: &str) -> String {
        if self.table.is_empty() {
            return text.to_string();
        }
        text.chars()
            .map(|c| self.table.get(&c).copied().unwrap_or(c))
            .collect()
    }

    /// Net number of characters the swap moves onto the secondary set
    fn score(&self, text: &str) -> i64 {
        let primary: HashSet<char> = self.primary.iter().copied().collect();
        let secondary: HashSet<char> = self.secondary.iter().copied().collect();
        text.chars().fold(0, |acc, c| {
            if primary.contains(&c) {
                acc + 1
            } else if secondary.contains(&c) {
                acc - 1
            } else {
                acc
            }
        })
    }
}

fn check_unique(id: u32, side: &'static str, chars: &[char]) -> Result<(), RegistryError> {
    let mut seen = HashSet::new();
    for &ch in chars {
        if !seen.insert(ch) {
            return Err(RegistryError::DuplicateCharacter { id, side, ch });
        }
    }
    Ok(())
}

/// Registered mapping groups, keyed by id
#[derive(Debug, Clone)]
pub struct MappingRegistry {
    groups: BTreeMap<u32, MappingGroup>,
}

impl Default for MappingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingRegistry {
    /// A registry holding only the identity group
    pub fn new() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert(IDENTITY_GROUP, MappingGroup::identity());
        Self { groups }
    }

    /// Adds a group; ids must be unique
    pub fn register(&mut self, group: MappingGroup) -> Result<(), RegistryError> {
        if self.groups.contains_key(&group.id) {
            return Err(RegistryError::DuplicateId(group.id));
        }
        self.groups.insert(group.id, group);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&MappingGroup> {
        self.groups.get(&id)
    }

    pub fn groups(&self) -> impl Iterator<Item = &MappingGroup> {
        self.groups.values()
    }

    /// Picks the group with the best coverage of `text`
    ///
    /// Ties go to the lowest id; the identity group wins unless some group
    /// scores above zero.
    pub fn select(&self, text: &str) -> &MappingGroup {
        let mut best: Option<(&MappingGroup, i64)> = None;
        for group in self.groups.values() {
            let score = group.score(text);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((group, score));
            }
        }

        match best {
            Some((group, score)) if score > 0 => {
                debug!(group = group.id, name = %group.name, score, "selected mapping group");
                group
            }
            _ => self
                .groups
                .get(&IDENTITY_GROUP)
                .unwrap_or_else(|| identity_group()),
        }
    }

    /// Registry with the groups every build ships
    ///
    /// # Panics
    ///
    /// Panics if a built-in group fails validation; that is a programming
    /// error and must surface at startup.
    pub fn builtin() -> &'static MappingRegistry {
        static BUILTIN: OnceLock<MappingRegistry> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            let mut registry = MappingRegistry::new();
            for group in [kana_group(), kanji_group()] {
                let group = group.unwrap_or_else(|e| panic!("invalid built-in mapping group: {e}"));
                registry
                    .register(group)
                    .unwrap_or_else(|e| panic!("invalid built-in mapping group: {e}"));
            }
            registry
        })
    }
}

fn identity_group() -> &'static MappingGroup {
    static IDENTITY: OnceLock<MappingGroup> = OnceLock::new();
    IDENTITY.get_or_init(MappingGroup::identity)
}

/// Code points below U+0100 that canonical JSON never emits raw
///
/// Control characters are escaped inside JSON strings, and the Latin-1 block
/// only appears when a task name contains it.
fn single_byte_pool() -> impl Iterator<Item = char> {
    ('\u{01}'..='\u{1F}')
        .filter(|&c| c != DELIMITER)
        .chain('\u{7F}'..='\u{FF}')
}

fn dedup(chars: impl IntoIterator<Item = char>) -> Vec<char> {
    let mut seen = HashSet::new();
    chars.into_iter().filter(|c| seen.insert(*c)).collect()
}

fn pooled_group(id: u32, name: &str, primary: Vec<char>) -> Result<MappingGroup, RegistryError> {
    let secondary: Vec<char> = single_byte_pool().collect();
    if primary.len() > secondary.len() {
        return Err(RegistryError::PoolExhausted {
            id,
            len: primary.len(),
            pool: secondary.len(),
        });
    }
    let secondary = secondary[..primary.len()].to_vec();
    MappingGroup::new(id, name, primary, secondary)
}

/// Punctuation, every hiragana, and katakana up to ユ; the pool has room for
/// no more.
fn kana_group() -> Result<MappingGroup, RegistryError> {
    let primary = dedup(
        ['、', '。', '「', '」', 'ー', '・']
            .into_iter()
            .chain('\u{3041}'..='\u{3093}')
            .chain('\u{30A1}'..='\u{30E6}'),
    );
    pooled_group(1, "kana", primary)
}

const COMMON_KANJI: &str = concat!(
    "日月年時分週間中前後上下大小新作業予定完了開始終確認資料会議報告準備対応修正設計",
    "実装試験検討提出連絡調整管理画進捗課題問内容発表企制販売購入注納品請求支払契約更",
    "変追加削除登録申承送付受取清掃買物病院家族旅行学校宿勉強練習読書運動洗濯電話手続",
    "引越片案件顧客社外部担当者署全体個別仕様要用保守障害査析改善成共有相談面採研一"
);

fn kanji_group() -> Result<MappingGroup, RegistryError> {
    pooled_group(2, "kanji", dedup(COMMON_KANJI.chars()))
}
