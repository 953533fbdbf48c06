// src/core/project_tree.rs

use crate::constants::MESON_OPTIONS_FILES;
use crate::core::paths::absolute_from;
use crate::models::{Target, TargetType};
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Source,
    /// `meson.build`, `meson.options` and friends.
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Project,
    Folder,
    File(FileKind),
    Target {
        /// The build key handed to the backend.
        full_name: String,
        target_type: TargetType,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectNode {
    pub kind: NodeKind,
    pub path: PathBuf,
    pub display_name: String,
    pub children: Vec<ProjectNode>,
}

impl ProjectNode {
    fn leaf(kind: NodeKind, path: PathBuf, display_name: String) -> Self {
        Self {
            kind,
            path,
            display_name,
            children: Vec::new(),
        }
    }

    /// Depth-first search for the node at `path`.
    pub fn find(&self, path: &Path) -> Option<&ProjectNode> {
        if self.path == path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(path))
    }

    /// Paths of every file node, in tree order.
    pub fn files(&self) -> Vec<&Path> {
        let mut files = Vec::new();
        self.visit(&mut |node| {
            if matches!(node.kind, NodeKind::File(_)) {
                files.push(node.path.as_path());
            }
        });
        files
    }

    /// Every target node, in tree order.
    pub fn targets(&self) -> Vec<&ProjectNode> {
        let mut targets = Vec::new();
        self.visit(&mut |node| {
            if matches!(node.kind, NodeKind::Target { .. }) {
                targets.push(node);
            }
        });
        targets
    }

    fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a ProjectNode)) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }
}

/// Folder under construction; sorted maps keep the final tree deterministic.
#[derive(Debug, Default)]
struct FolderBuilder {
    path: PathBuf,
    folders: BTreeMap<String, FolderBuilder>,
    leaves: Vec<ProjectNode>,
}

impl FolderBuilder {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            ..Self::default()
        }
    }

    fn descend(&mut self, names: Vec<String>) -> &mut FolderBuilder {
        let mut current = self;
        for name in names {
            let path = current.path.join(&name);
            current = current
                .folders
                .entry(name)
                .or_insert_with(|| FolderBuilder::new(path));
        }
        current
    }

    fn into_node(self, kind: NodeKind, display_name: String) -> ProjectNode {
        let mut children: Vec<ProjectNode> = self
            .folders
            .into_iter()
            .map(|(name, folder)| folder.into_node(NodeKind::Folder, name))
            .collect();
        let mut leaves = self.leaves;
        leaves.sort_by(|a, b| a.display_name.cmp(&b.display_name).then_with(|| a.path.cmp(&b.path)));
        children.extend(leaves);
        ProjectNode {
            kind,
            path: self.path,
            display_name,
            children,
        }
    }
}

struct TreeBuilder {
    source_dir: PathBuf,
    root: FolderBuilder,
    /// Folders for files living outside the source directory, keyed by absolute directory.
    external: BTreeMap<PathBuf, FolderBuilder>,
    seen: HashSet<PathBuf>,
}

impl TreeBuilder {
    fn new(source_dir: &Path) -> Self {
        Self {
            source_dir: source_dir.to_path_buf(),
            root: FolderBuilder::new(source_dir.to_path_buf()),
            external: BTreeMap::new(),
            seen: HashSet::new(),
        }
    }

    fn folder_for(&mut self, dir: &Path) -> &mut FolderBuilder {
        match dir.strip_prefix(&self.source_dir) {
            Ok(relative) => {
                let names = relative
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect();
                self.root.descend(names)
            }
            Err(_) => self
                .external
                .entry(dir.to_path_buf())
                .or_insert_with(|| FolderBuilder::new(dir.to_path_buf())),
        }
    }

    fn add_file(&mut self, path: &Path, kind: FileKind) {
        let path = absolute_from(&self.source_dir, path);
        if !self.seen.insert(path.clone()) {
            return;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            return;
        };
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.folder_for(&dir)
            .leaves
            .push(ProjectNode::leaf(NodeKind::File(kind), path, name));
    }

    fn add_target(&mut self, target: &Target, build_dir: &Path) {
        let dir = absolute_from(&self.source_dir, target.defined_in_dir());
        let node = ProjectNode::leaf(
            NodeKind::Target {
                full_name: target.full_name(build_dir),
                target_type: target.target_type,
            },
            dir.join(&target.name),
            target.name.clone(),
        );
        self.folder_for(&dir).leaves.push(node);
    }

    fn finish(self) -> ProjectNode {
        let display_name = self
            .source_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_dir.display().to_string());
        let mut root = self.root.into_node(NodeKind::Project, display_name);
        root.children.extend(
            self.external
                .into_iter()
                .map(|(dir, folder)| folder.into_node(NodeKind::Folder, dir.display().to_string())),
        );
        root
    }
}

/// Builds a fresh project tree from one parse result.
///
/// Sources and extra files of every target come first, then the build-system files and the
/// options file, then one node per target under the folder of its defining `meson.build`.
pub fn build_project_tree(
    source_dir: &Path,
    build_dir: &Path,
    targets: &[Target],
    build_system_files: &[PathBuf],
) -> ProjectNode {
    let mut builder = TreeBuilder::new(source_dir);

    for target in targets {
        for group in &target.sources {
            for source in &group.sources {
                builder.add_file(source, FileKind::Source);
            }
        }
        for extra in &target.extra_files {
            builder.add_file(extra, FileKind::Source);
        }
    }

    for file in build_system_files {
        builder.add_file(file, FileKind::Project);
    }
    for options_file in MESON_OPTIONS_FILES {
        let path = source_dir.join(options_file);
        if path.is_file() {
            builder.add_file(&path, FileKind::Project);
        }
    }

    for target in targets {
        builder.add_target(target, build_dir);
    }

    builder.finish()
}

/// Renders the tree with box-drawing connectors, one node per line.
pub fn render_tree(root: &ProjectNode) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", root.display_name);
    let count = root.children.len();
    for (i, child) in root.children.iter().enumerate() {
        render_node(child, "", i + 1 == count, &mut out);
    }
    out
}

fn render_node(node: &ProjectNode, prefix: &str, is_last: bool, out: &mut String) {
    let connector = if is_last { "└─" } else { "├─" };
    let label = match &node.kind {
        NodeKind::Folder => format!("{}/", node.display_name),
        NodeKind::Target { full_name, target_type } => {
            format!("{} [{}] ({})", node.display_name, target_type.as_str(), full_name)
        }
        _ => node.display_name.clone(),
    };
    let _ = writeln!(out, "{}{}{}", prefix, connector, label);

    let child_prefix = format!("{}{}", prefix, if is_last { "   " } else { "│  " });
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        render_node(child, &child_prefix, i + 1 == count, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceGroup;
    use std::fs;
    use tempfile::TempDir;

    fn target(name: &str, defined_in: &str, output: &str, sources: &[&str]) -> Target {
        Target::new(
            TargetType::Executable,
            name.to_string(),
            format!("{}@exe", name),
            defined_in,
            vec![output.to_string()],
            vec![],
            None,
            vec![SourceGroup::new(
                "c".to_string(),
                vec!["cc".to_string()],
                vec![],
                sources.iter().map(|s| s.to_string()).collect(),
                vec![],
            )],
        )
    }

    #[test]
    fn test_builds_folders_files_and_targets() {
        let src = Path::new("/proj");
        let targets = vec![
            target("app", "/proj/meson.build", "/proj/build/app", &["/proj/main.c", "/proj/lib/util.c"]),
            target("tool", "/proj/tools/meson.build", "/proj/build/tools/tool", &["/proj/tools/tool.c", "/proj/main.c"]),
        ];
        let files = vec![PathBuf::from("meson.build"), PathBuf::from("/proj/tools/meson.build")];
        let tree = build_project_tree(src, Path::new("/proj/build"), &targets, &files);

        assert_eq!(tree.kind, NodeKind::Project);
        assert_eq!(tree.display_name, "proj");
        // main.c is shared by both targets but appears once.
        assert_eq!(
            tree.files().iter().filter(|p| **p == Path::new("/proj/main.c")).count(),
            1
        );
        assert_eq!(
            tree.find(Path::new("/proj/meson.build")).map(|n| &n.kind),
            Some(&NodeKind::File(FileKind::Project))
        );

        let tool = tree.find(Path::new("/proj/tools/tool")).unwrap();
        assert_eq!(
            tool.kind,
            NodeKind::Target {
                full_name: "tools/tool".to_string(),
                target_type: TargetType::Executable
            }
        );
        let tools_dir = tree.find(Path::new("/proj/tools")).unwrap();
        assert_eq!(tools_dir.kind, NodeKind::Folder);
        assert_eq!(tree.targets().len(), 2);
    }

    #[test]
    fn test_files_outside_source_dir_get_their_own_folder() {
        let targets = vec![target("app", "/proj/meson.build", "/b/app", &["/usr/share/gen/x.c"])];
        let tree = build_project_tree(Path::new("/proj"), Path::new("/b"), &targets, &[]);
        let external = tree.find(Path::new("/usr/share/gen")).unwrap();
        assert_eq!(external.display_name, "/usr/share/gen");
        assert_eq!(external.children[0].display_name, "x.c");
    }

    #[test]
    fn test_options_file_is_added_when_present() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("meson_options.txt"), "").unwrap();
        let tree = build_project_tree(src.path(), &src.path().join("build"), &[], &[]);
        assert!(tree.find(&src.path().join("meson_options.txt")).is_some());
        assert!(tree.find(&src.path().join("meson.options")).is_none());
    }

    #[test]
    fn test_tree_is_deterministic() {
        let a = target("a", "/p/meson.build", "/p/b/a", &["/p/z.c", "/p/sub/y.c", "/p/x.c"]);
        let b = target("b", "/p/meson.build", "/p/b/b", &["/p/w.c"]);
        let first = build_project_tree(Path::new("/p"), Path::new("/p/b"), &[a.clone(), b.clone()], &[]);
        let second = build_project_tree(Path::new("/p"), Path::new("/p/b"), &[a, b], &[]);
        assert_eq!(first, second);
        let names: Vec<_> = first.children.iter().map(|c| c.display_name.as_str()).collect();
        assert_eq!(names, ["sub", "a", "b", "w.c", "x.c", "z.c"]);
    }

    #[test]
    fn test_render_tree_uses_connectors() {
        let targets = vec![target("app", "/p/meson.build", "/p/b/app", &["/p/main.c"])];
        let rendered = render_tree(&build_project_tree(Path::new("/p"), Path::new("/p/b"), &targets, &[]));
        assert!(rendered.starts_with("p\n"));
        assert!(rendered.contains("├─app [executable] (app)"));
        assert!(rendered.contains("└─main.c"));
    }
}
