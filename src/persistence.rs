// File: src/persistence.rs
use crate::error::{Error, Result};
use crate::spi::{KbGraph, ShortestPathTree};
use log::info;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const TREE_EXTENSION: &str = "spt";

/// File holding the tree of the resource at `index` (1-based) in the graph's ordering.
pub fn tree_path(directory: &Path, index: usize) -> PathBuf {
    directory.join(format!("{index}.{TREE_EXTENSION}"))
}

pub fn save_tree(tree: &ShortestPathTree, path: &Path) -> Result<()> {
    let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent_dir)?;

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    let writer = BufWriter::new(&temp_file);
    bincode::serialize_into(writer, tree)?;

    temp_file.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

pub fn load_tree(path: &Path) -> Result<ShortestPathTree> {
    if !path.exists() {
        return Err(Error::MissingTree(path.to_path_buf()));
    }
    let reader = BufReader::new(File::open(path)?);
    let mut tree: ShortestPathTree = bincode::deserialize_from(reader)?;
    tree.reindex();
    Ok(tree)
}

/// Indices that already have a tree file in `directory`.
pub fn processed_indices(directory: &Path) -> Result<BTreeSet<usize>> {
    let mut done = BTreeSet::new();
    if !directory.exists() {
        return Ok(done);
    }
    for entry in fs::read_dir(directory)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(TREE_EXTENSION) {
            continue;
        }
        if let Some(index) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| s.parse().ok()) {
            done.insert(index);
        }
    }
    Ok(done)
}

/// Computes and writes the tree of every resource of `graph` that has no file yet.
/// Returns how many trees were written.
pub fn precompute_all(graph: &KbGraph, directory: &Path) -> Result<usize> {
    fs::create_dir_all(directory)?;
    let done = processed_indices(directory)?;
    info!("{} of {} shortest-path trees already on disk", done.len(), graph.len());

    let todo: Vec<(usize, _)> = graph
        .resources()
        .iter()
        .enumerate()
        .map(|(i, r)| (i + 1, r))
        .filter(|(index, _)| !done.contains(index))
        .collect();

    todo.par_iter()
        .map(|(index, resource)| match graph.shortest_path_tree(resource) {
            Some(tree) => save_tree(&tree, &tree_path(directory, *index)),
            None => Ok(()),
        })
        .collect::<Result<Vec<()>>>()?;

    info!("wrote {} shortest-path trees to {}", todo.len(), directory.display());
    Ok(todo.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::relation::{Direction, SpatialTriple};
    use crate::core::types::ResourceId;

    fn graph() -> KbGraph {
        KbGraph::new(
            &[
                SpatialTriple::new("http://kb/a", Direction::South, "http://kb/b"),
                SpatialTriple::new("http://kb/b", Direction::East, "http://kb/c"),
            ],
            &[],
        )
    }

    #[test]
    fn tree_survives_a_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph();
        let a = ResourceId::named("http://kb/a");
        let tree = g.shortest_path_tree(&a).unwrap();
        let path = tree_path(dir.path(), g.file_index(&a).unwrap());
        save_tree(&tree, &path).unwrap();

        let loaded = load_tree(&path).unwrap();
        assert_eq!(loaded, tree);
        assert_eq!(loaded.distance(&ResourceId::named("http://kb/c")), Some(2));
    }

    #[test]
    fn missing_tree_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_tree(&tree_path(dir.path(), 7)).unwrap_err();
        assert!(matches!(err, Error::MissingTree(_)));
    }

    #[test]
    fn precompute_is_resumable() {
        let dir = tempfile::tempdir().unwrap();
        let g = graph();
        assert_eq!(precompute_all(&g, dir.path()).unwrap(), 3);
        assert_eq!(processed_indices(dir.path()).unwrap().len(), 3);
        assert_eq!(precompute_all(&g, dir.path()).unwrap(), 0);

        fs::remove_file(tree_path(dir.path(), 2)).unwrap();
        assert_eq!(precompute_all(&g, dir.path()).unwrap(), 1);
    }
}
