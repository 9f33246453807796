use std::collections::HashMap;

use tracing::debug;

use pmd_model::{After, Startup};

use super::BootError;

/// Boot entries sorted by resolved weight.
#[derive(Clone, Debug, Default)]
pub struct StartupTree {
    entries: Vec<(i64, Startup)>,
}

impl StartupTree {
    /// Resolves the weight of every entry and sorts them, keeping input order on ties.
    ///
    /// Entries that fail to resolve are left out and reported; they never abort the batch.
    pub fn new(entries: Vec<Startup>) -> (Self, Vec<BootError>) {
        let mut errors = Vec::new();
        let mut index: HashMap<&str, &Startup> = HashMap::new();
        let mut order = Vec::new();
        for entry in &entries {
            if entry.key.is_empty() {
                errors.push(BootError::MissingKey(entry.name.clone()));
            } else if index.contains_key(entry.key.as_str()) {
                errors.push(BootError::DuplicateKey(entry.key.clone()));
            } else {
                index.insert(&entry.key, entry);
                order.push(entry);
            }
        }

        let mut resolver = Resolver {
            index: &index,
            marks: HashMap::new(),
            chain: Vec::new(),
            errors,
        };
        let mut tree: Vec<(i64, Startup)> = order
            .into_iter()
            .filter_map(|entry| {
                let weight = resolver.resolve(&entry.key)?;
                debug!(target: "pmd.core.boot", key = %entry.key, weight, "entry resolved");
                Some((weight, entry.clone()))
            })
            .collect();
        tree.sort_by_key(|(weight, _)| *weight);

        (Self { entries: tree }, resolver.errors)
    }

    /// Entries in run order.
    pub fn services(&self) -> impl Iterator<Item = &Startup> {
        self.entries.iter().map(|(_, entry)| entry)
    }

    /// Entries with `low <= weight < high`; `high == After::END` means no upper bound.
    pub fn slice(&self, low: i64, high: i64) -> Vec<Startup> {
        self.entries
            .iter()
            .filter(|(w, _)| *w >= low && (high == After::END || *w < high))
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    pub fn weight(&self, key: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.key == key)
            .map(|(w, _)| *w)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Copy)]
enum Mark {
    Resolved(i64),
    Broken,
}

struct Resolver<'a> {
    index: &'a HashMap<&'a str, &'a Startup>,
    marks: HashMap<String, Mark>,
    chain: Vec<String>,
    errors: Vec<BootError>,
}

impl Resolver<'_> {
    /// Depth-first weight resolution; `chain` holds the keys currently being resolved.
    fn resolve(&mut self, key: &str) -> Option<i64> {
        if let Some(mark) = self.marks.get(key) {
            return match *mark {
                Mark::Resolved(weight) => Some(weight),
                Mark::Broken => None,
            };
        }
        if let Some(pos) = self.chain.iter().position(|k| k == key) {
            self.break_cycle(pos, key);
            return None;
        }
        let entry = *self.index.get(key)?;
        if entry.after.is_empty() {
            self.marks.insert(key.to_string(), Mark::Resolved(After::Boot.weight()));
            return Some(After::Boot.weight());
        }

        self.chain.push(key.to_string());
        let mut weight = 0;
        let mut broken = false;
        for dep in &entry.after {
            if let Some(priority) = After::parse(dep) {
                weight += priority.weight();
                continue;
            }
            if !self.index.contains_key(dep.as_str()) {
                self.errors.push(BootError::UnknownDependency {
                    key: key.to_string(),
                    dependency: dep.clone(),
                });
                broken = true;
                continue;
            }
            match self.resolve(dep) {
                Some(w) => weight += w + 1,
                None => {
                    broken = true;
                    if !matches!(self.marks.get(key), Some(Mark::Broken)) {
                        self.errors.push(BootError::BrokenDependency {
                            key: key.to_string(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }
        self.chain.pop();

        let mark = self
            .marks
            .entry(key.to_string())
            .or_insert(if broken { Mark::Broken } else { Mark::Resolved(weight) });
        match *mark {
            Mark::Resolved(weight) => Some(weight),
            Mark::Broken => None,
        }
    }

    /// Marks every member of the cycle starting at `chain[pos]` as broken.
    fn break_cycle(&mut self, pos: usize, key: &str) {
        let mut cycle = self.chain[pos..].to_vec();
        cycle.push(key.to_string());
        for member in &self.chain[pos..] {
            self.marks.insert(member.clone(), Mark::Broken);
            self.errors.push(BootError::Cyclic {
                key: member.clone(),
                chain: cycle.clone(),
            });
        }
    }
}
