use serde::Serialize;

/// One member of a selectable family (an input or a surround mode)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectableItem<K> {
    pub key: K,
    pub name: String,
    pub is_selected: bool,
}

/// Ordered family of items with at most one selected
#[derive(Debug, Clone, Serialize)]
pub struct SelectableItems<K> {
    items: Vec<SelectableItem<K>>,
}

impl<K: Clone + PartialEq> SelectableItems<K> {
    pub fn new(entries: impl IntoIterator<Item = (K, String)>) -> Self {
        let items = entries
            .into_iter()
            .map(|(key, name)| SelectableItem {
                key,
                name,
                is_selected: false,
            })
            .collect();
        Self { items }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.items.iter().any(|item| &item.key == key)
    }

    pub fn selected(&self) -> Option<&K> {
        self.items
            .iter()
            .find(|item| item.is_selected)
            .map(|item| &item.key)
    }

    pub fn items(&self) -> &[SelectableItem<K>] {
        &self.items
    }

    /// Select `key` and unselect the others
    ///
    /// Returns the items whose flag actually flipped.
    pub fn select_only(&mut self, key: &K) -> Vec<(K, bool)> {
        self.set_each(|item| &item.key == key)
    }

    /// Unselect everything, returning the items that flipped
    pub fn clear(&mut self) -> Vec<(K, bool)> {
        self.set_each(|_| false)
    }

    fn set_each(&mut self, selected: impl Fn(&SelectableItem<K>) -> bool) -> Vec<(K, bool)> {
        let mut changed = Vec::new();
        for item in &mut self.items {
            let value = selected(item);
            if item.is_selected != value {
                item.is_selected = value;
                changed.push((item.key.clone(), value));
            }
        }
        changed
    }
}
