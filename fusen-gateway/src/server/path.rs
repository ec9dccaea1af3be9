use std::collections::HashMap;

/// Segment trie over `/` separated paths. A segment starting with `:` captures
/// one non empty request segment. The capture name ends at the first character
/// that is not `[A-Za-z0-9_]`, the rest of the segment is a literal suffix the
/// request segment has to end with (`:shelf:cancel`).
#[derive(Debug, Clone)]
pub struct PathTrie<T> {
    root: TreeNode<T>,
}

impl<T> Default for PathTrie<T> {
    fn default() -> Self {
        Self {
            root: TreeNode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Capture {
    name: String,
    suffix: String,
}

impl Capture {
    fn parse(segment: &str) -> Self {
        let end = segment
            .find(|e: char| !(e.is_ascii_alphanumeric() || e == '_'))
            .unwrap_or(segment.len());
        Self {
            name: segment[..end].to_owned(),
            suffix: segment[end..].to_owned(),
        }
    }

    fn capture<'a>(&self, item: &'a str) -> Option<&'a str> {
        item.strip_suffix(self.suffix.as_str())
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone)]
struct TreeNode<T> {
    nodes: HashMap<String, TreeNode<T>>,
    // suffixed captures first, then plain ones, each in insertion order
    params: Vec<(Capture, TreeNode<T>)>,
    value: Option<T>,
}

impl<T> Default for TreeNode<T> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            params: vec![],
            value: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct QueryResult<'a, T> {
    pub value: &'a T,
    pub params: Vec<(String, String)>,
}

fn segments(path: &str) -> Vec<&str> {
    let path = match path.strip_suffix('/') {
        Some(path) if !path.is_empty() => path,
        _ => path,
    };
    path.split('/').collect()
}

impl<T> PathTrie<T> {
    /// Returns `false` and keeps the existing value when the path is taken.
    pub fn insert(&mut self, path: &str, value: T) -> bool {
        let mut temp = &mut self.root;
        for item in segments(path) {
            temp = match item.strip_prefix(':') {
                Some(segment) => {
                    let capture = Capture::parse(segment);
                    let idx = match temp.params.iter().position(|(e, _)| *e == capture) {
                        Some(idx) => idx,
                        None => {
                            let idx = if capture.suffix.is_empty() {
                                temp.params.len()
                            } else {
                                temp.params
                                    .iter()
                                    .position(|(e, _)| e.suffix.is_empty())
                                    .unwrap_or(temp.params.len())
                            };
                            temp.params.insert(idx, (capture, TreeNode::default()));
                            idx
                        }
                    };
                    &mut temp.params[idx].1
                }
                None => temp.nodes.entry(item.to_owned()).or_default(),
            };
        }
        if temp.value.is_some() {
            return false;
        }
        temp.value = Some(value);
        true
    }

    /// Static segments are tried before captures, suffixed captures before
    /// plain ones.
    pub fn search(&self, path: &str) -> Option<QueryResult<'_, T>> {
        let paths = segments(path);
        let mut params = vec![];
        let value = Self::search_by_nodes(&paths, &self.root, &mut params)?;
        Some(QueryResult { value, params })
    }

    fn search_by_nodes<'a>(
        paths: &[&str],
        temp: &'a TreeNode<T>,
        params: &mut Vec<(String, String)>,
    ) -> Option<&'a T> {
        let Some((item, rest)) = paths.split_first() else {
            return temp.value.as_ref();
        };
        if let Some(node) = temp.nodes.get(*item) {
            if let Some(value) = Self::search_by_nodes(rest, node, params) {
                return Some(value);
            }
        }
        if item.is_empty() {
            return None;
        }
        for (capture, node) in &temp.params {
            let Some(value) = capture.capture(item) else {
                continue;
            };
            params.push((capture.name.clone(), value.to_owned()));
            if let Some(value) = Self::search_by_nodes(rest, node, params) {
                return Some(value);
            }
            params.pop();
        }
        None
    }
}
