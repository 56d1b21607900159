//! Property sweeps over built sections: round-trip resolution, index
//! integrity, record ordering, and offset stability.

use std::collections::HashSet;
use std::path::Path;

use tempfile::{tempdir, TempDir};

use ffs_section::layout::{
    Status, BUCKET_COUNT, INDEX_SENTINEL, SECTION_HEADER_SIZE,
};
use ffs_section::view::SectionView;
use ffs_section::{resolver, wpath};
use ffs_statd::applier::ChangeApplier;
use ffs_statd::arena::align_up;
use ffs_statd::build_snapshot;
use ffs_statd::region::Region;
use ffs_statd::source::{FsTreeSource, PathMap};
use ffs_statd::watch::{ChangeAction, ChangeEvent};

const SECTION_ROOT: &str = "z:\\root";

struct Fixture {
    _tmp: TempDir,
    region: Region,
    source: FsTreeSource,
    map: PathMap,
}

fn build_fixture(cap: usize, populate: impl FnOnce(&Path)) -> Fixture {
    let tmp = tempdir().unwrap();
    let tree = tmp.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    populate(&tree);

    let map = PathMap::new(tree, SECTION_ROOT);
    let source = FsTreeSource::new(map.clone());
    let mut region = Region::create(&tmp.path().join("section.ffs"), cap).unwrap();
    build_snapshot(&mut region, &source, &map.section_root().to_vec()).unwrap();

    Fixture {
        _tmp: tmp,
        region,
        source,
        map,
    }
}

fn nested_tree(tree: &Path) {
    std::fs::write(tree.join("a.txt"), b"alpha").unwrap();
    std::fs::write(tree.join("z.bin"), vec![0u8; 1000]).unwrap();
    let sub1 = tree.join("sub1");
    std::fs::create_dir(&sub1).unwrap();
    std::fs::write(sub1.join("b.txt"), b"beta").unwrap();
    let sub2 = sub1.join("sub2");
    std::fs::create_dir(&sub2).unwrap();
    std::fs::write(sub2.join("c.txt"), b"gamma").unwrap();
    std::fs::write(sub2.join("d d.txt"), b"space name").unwrap();
    std::fs::create_dir(tree.join("empty")).unwrap();
}

/// Rebuild a record's full path by climbing the parent chain to the
/// synthetic root.
fn reconstruct(view: &SectionView, offset: u32) -> Vec<u16> {
    let rec = view.record(offset).unwrap();
    if rec.parent_offset == 0 {
        return view.name_of(&rec);
    }
    let mut path = reconstruct(view, rec.parent_offset);
    path.push(wpath::SEP);
    path.extend(view.name_of(&rec));
    path
}

/// Collect every host path under `dir`, relative section paths included.
fn collect_paths(map: &PathMap, dir: &Path, out: &mut Vec<Vec<u16>>) {
    for entry in std::fs::read_dir(dir).unwrap() {
        let entry = entry.unwrap();
        out.push(map.to_section(&entry.path()).unwrap());
        if entry.file_type().unwrap().is_dir() {
            collect_paths(map, &entry.path(), out);
        }
    }
}

#[test]
fn every_real_path_round_trips() {
    let fixture = build_fixture(4 * 1024 * 1024, nested_tree);
    let view = fixture.region.view().unwrap();

    let mut paths = Vec::new();
    collect_paths(&fixture.map, fixture.map.host_root(), &mut paths);
    assert!(paths.len() >= 8);

    for path in paths {
        let offset = resolver::resolve_any(&view, &path)
            .unwrap_or_else(|| panic!("unresolved: {}", wpath::decode(&path)));
        let rebuilt = reconstruct(&view, offset);
        assert_eq!(
            wpath::decode(&rebuilt),
            wpath::decode(&path),
            "reconstructed path diverges"
        );
    }
}

#[test]
fn arena_sweep_matches_counts_and_grouping() {
    let fixture = build_fixture(4 * 1024 * 1024, nested_tree);
    let view = fixture.region.view().unwrap();
    let header = view.header();

    let mut offset = SECTION_HEADER_SIZE as u32;
    let mut count = 0u32;
    let mut group_id = u32::MAX;
    while offset < header.bytes {
        let rec = view.record(offset).unwrap_or_else(|| {
            panic!("arena sweep hit an undecodable record at {offset}")
        });
        count += 1;

        let name = view.name_of(&rec);
        if rec.parent_offset == 0 {
            assert!(rec.is_synthetic_root());
            assert_eq!(offset, header.root_offset);
        } else if rec.parent_offset != group_id {
            // first record of a new group is its "." leader
            assert!(
                wpath::is_dot(&name),
                "group at {offset} does not open with its self entry"
            );
            group_id = rec.parent_offset;
            // the group id designates a directory record
            let parent = view.record(rec.parent_offset).unwrap();
            assert!(parent.is_directory() || parent.is_synthetic_root());
        } else {
            assert!(
                !wpath::is_dot(&name) && !wpath::is_dot_dot(&name),
                "dot entry beyond group leader at {offset}"
            );
        }
        offset = rec.next_offset();
    }

    assert_eq!(offset, header.bytes);
    assert_eq!(count, header.num_nodes);
}

#[test]
fn finished_sections_satisfy_index_invariants() {
    let fixture = build_fixture(4 * 1024 * 1024, nested_tree);
    let view = fixture.region.view().unwrap();
    let header = view.header();

    assert_eq!(view.status(), Some(Status::Finished));
    assert_ne!(header.dir_offset, 0);

    // sentinel sits at the first 16-byte boundary past the arena
    let sentinel_at = align_up(header.bytes, 16);
    assert_eq!(view.u32_at(sentinel_at), Some(INDEX_SENTINEL));

    // bucket count mirrors the header
    assert_eq!(view.u32_at(header.dir_offset), Some(header.num_dirs));

    // every chain entry points into the arena, at a record boundary
    let mut total = 0u32;
    for bucket in 0..BUCKET_COUNT {
        let head = view.bucket_head(bucket).unwrap();
        assert!(head > sentinel_at && head < header.dir_offset);
        for leader_offset in view.bucket_chain(bucket) {
            total += 1;
            assert!(leader_offset >= SECTION_HEADER_SIZE as u32);
            assert!(leader_offset < header.bytes);
            let rec = view.record(leader_offset).unwrap();
            assert!(wpath::is_dot(&view.name_of(&rec)));
        }
    }
    assert_eq!(total, header.num_dirs);
}

#[test]
fn colliding_directories_share_a_chain_and_stay_unique() {
    // 1600 sibling directories over 1543 buckets: some chain must collide.
    let fixture = build_fixture(16 * 1024 * 1024, |tree| {
        for i in 0..1600 {
            std::fs::create_dir(tree.join(format!("d{i:04}"))).unwrap();
        }
    });
    let view = fixture.region.view().unwrap();
    assert_eq!(view.header().num_dirs, 1601);

    let mut seen = HashSet::new();
    let mut longest = 0usize;
    for bucket in 0..BUCKET_COUNT {
        let chain: Vec<u32> = view.bucket_chain(bucket).collect();
        longest = longest.max(chain.len());
        for offset in chain {
            assert!(seen.insert(offset), "offset {offset} appears twice");
        }
    }
    assert_eq!(seen.len(), 1601);
    assert!(longest >= 2, "expected at least one colliding bucket");

    // collisions notwithstanding, every directory resolves
    for i in 0..1600 {
        let path = wpath::encode(&format!("{SECTION_ROOT}\\d{i:04}"));
        assert!(
            resolver::resolve_directory(&view, &path).is_some(),
            "d{i:04} failed to resolve"
        );
    }
}

#[test]
fn offsets_are_stable_across_updates() {
    let mut fixture = build_fixture(4 * 1024 * 1024, nested_tree);

    let targets = [
        wpath::encode(&format!("{SECTION_ROOT}\\a.txt")),
        wpath::encode(&format!("{SECTION_ROOT}\\sub1\\b.txt")),
        wpath::encode(&format!("{SECTION_ROOT}\\sub1\\sub2\\c.txt")),
    ];
    let before: Vec<u32> = {
        let view = fixture.region.view().unwrap();
        targets
            .iter()
            .map(|p| resolver::resolve_any(&view, p).unwrap())
            .collect()
    };

    std::fs::write(fixture.map.host_root().join("a.txt"), b"rewritten!").unwrap();
    std::fs::write(
        fixture.map.host_root().join("sub1").join("b.txt"),
        b"also rewritten",
    )
    .unwrap();

    let mut applier = ChangeApplier::new(&mut fixture.region, &fixture.source);
    applier.apply_batch(&[
        ChangeEvent {
            action: ChangeAction::Modified,
            path: targets[0].clone(),
        },
        ChangeEvent {
            action: ChangeAction::Modified,
            path: targets[1].clone(),
        },
    ]);
    drop(applier);

    let view = fixture.region.view().unwrap();
    let after: Vec<u32> = targets
        .iter()
        .map(|p| resolver::resolve_any(&view, p).unwrap())
        .collect();
    assert_eq!(before, after);
    assert_eq!(view.record(after[0]).unwrap().size, 10);
}
