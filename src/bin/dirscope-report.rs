//! Scan a directory and print its largest entries as an indented list.
//!
//! Usage: `dirscope-report [PATH] [DEPTH]`

use dirscope::crawler::FileCrawler;
use dirscope::tier::format_size;
use dirscope::tree::{DirectoryTree, EntryKind};
use dirscope::{ScanConfig, ScanStatus};
use indextree::NodeId;
use std::process::ExitCode;

const DEFAULT_DEPTH: usize = 2;
const ROWS_PER_LEVEL: usize = 10;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| ".".to_string());
    let depth = args
        .next()
        .and_then(|d| d.parse().ok())
        .unwrap_or(DEFAULT_DEPTH);

    let crawler = FileCrawler::new(ScanConfig::load());
    let mut last_tree = None;
    let result = crawler.scan(&path, |snapshot| {
        log::info!(
            "{} items, {} so far, at {}",
            snapshot.items_visited,
            format_size(snapshot.tree.total_size()),
            snapshot.current_path.display()
        );
        last_tree = Some(snapshot.tree);
    });

    match result {
        Ok(ScanStatus::Completed) => {}
        Ok(ScanStatus::Cancelled) => {
            eprintln!("Scan cancelled");
            return ExitCode::FAILURE;
        }
        Err(err) => {
            eprintln!("Scan failed: {}", err);
            return ExitCode::FAILURE;
        }
    }

    let Some(tree) = last_tree else {
        return ExitCode::SUCCESS;
    };
    let root = tree.root_entry();
    println!("{}  {}", format_size(root.size), root.path.display());
    print_children(&tree, tree.get_root(), 1, depth);
    ExitCode::SUCCESS
}

fn print_children(tree: &DirectoryTree, node: NodeId, level: usize, max_depth: usize) {
    if level > max_depth {
        return;
    }

    let children = tree.child_entries(node);
    let hidden = children.len().saturating_sub(ROWS_PER_LEVEL);
    for (child_id, entry) in children.into_iter().take(ROWS_PER_LEVEL) {
        let marker = match entry.kind {
            EntryKind::Directory => "/",
            EntryKind::AtomicUnit => " [bundle]",
            EntryKind::Unreadable => " [unreadable]",
            EntryKind::File => "",
        };
        println!(
            "{}{:>10} {:>5.1}%  {}{}",
            "  ".repeat(level),
            format_size(entry.size),
            entry.percentage_of_parent,
            entry.name,
            marker
        );
        print_children(tree, child_id, level + 1, max_depth);
    }
    if hidden > 0 {
        println!("{}  ... {} more", "  ".repeat(level), hidden);
    }
}
