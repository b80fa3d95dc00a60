use lumio_io::CommentView;
use serde::Serialize;
use std::collections::HashMap;

/// A comment placed in render order with its nesting depth (root = 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadedComment {
    pub comment: CommentView,
    pub depth: usize,
}

/// Rebuilds the reply tree from a flat list and flattens it depth-first,
/// parents before children. Siblings keep their input order. A comment whose
/// parent is not part of `comments` is rendered as an extra root.
pub fn build_comment_tree(comments: &[CommentView]) -> Vec<ThreadedComment> {
    let mut index_by_id: HashMap<u64, usize> = HashMap::with_capacity(comments.len());
    for (index, comment) in comments.iter().enumerate() {
        index_by_id.entry(comment.id).or_insert(index);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); comments.len()];
    let mut roots = Vec::new();
    for (index, comment) in comments.iter().enumerate() {
        let parent = comment
            .parent_id
            .and_then(|parent_id| index_by_id.get(&parent_id).copied())
            .filter(|&parent| parent != index);
        match parent {
            Some(parent) => children[parent].push(index),
            None => roots.push(index),
        }
    }

    let mut visited = vec![false; comments.len()];
    let mut ordered = Vec::with_capacity(comments.len());
    walk(&roots, &children, comments, &mut visited, &mut ordered);

    // Only reachable through a parent cycle, which the contract rules out.
    let leftovers: Vec<usize> = (0..comments.len()).filter(|&i| !visited[i]).collect();
    if !leftovers.is_empty() {
        tracing::warn!(count = leftovers.len(), "comment parent cycle, rendering as roots");
        walk(&leftovers, &children, comments, &mut visited, &mut ordered);
    }
    ordered
}

fn walk(
    starts: &[usize],
    children: &[Vec<usize>],
    comments: &[CommentView],
    visited: &mut [bool],
    ordered: &mut Vec<ThreadedComment>,
) {
    let mut stack: Vec<(usize, usize)> = starts.iter().rev().map(|&index| (index, 0)).collect();
    while let Some((index, depth)) = stack.pop() {
        if visited[index] {
            continue;
        }
        visited[index] = true;
        ordered.push(ThreadedComment {
            comment: comments[index].clone(),
            depth,
        });
        for &child in children[index].iter().rev() {
            stack.push((child, depth + 1));
        }
    }
}
