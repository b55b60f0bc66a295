//! On-disk integration tests for the metadata index.

use discordfs_meta::types::FileRecord;
use discordfs_meta::{ChunkRef, MetadataIndex};

fn sample_record(path: &str) -> FileRecord {
    FileRecord::new_file(
        path,
        40,
        vec![ChunkRef {
            chunk_index: 0,
            message_id: 9_876_543_210,
            attachment_url: format!("https://cdn.example/att/{path}"),
            size_bytes: 40,
            crc32: 0x1234_5678,
        }],
    )
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("metadata.db");

    {
        let index = MetadataIndex::open(&db_path).unwrap();
        index.save(&sample_record("docs/report.txt")).unwrap();
        index.save(&FileRecord::new_directory("docs")).unwrap();
    }

    let index = MetadataIndex::open(&db_path).unwrap();
    let fetched = index.get("docs/report.txt").unwrap().unwrap();
    assert_eq!(fetched.size_bytes, 40);
    assert_eq!(fetched.chunks.len(), 1);
    assert_eq!(fetched.chunks[0].message_id, 9_876_543_210);

    let listing = index.list("docs").unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].file_name, "report.txt");
}

#[test]
fn rename_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("metadata.db");

    {
        let index = MetadataIndex::open(&db_path).unwrap();
        index.save(&sample_record("a.txt")).unwrap();
        index.rename("a.txt", "b.txt").unwrap();
    }

    let index = MetadataIndex::open(&db_path).unwrap();
    assert!(index.get("a.txt").unwrap().is_none());
    let fetched = index.get("b.txt").unwrap().unwrap();
    assert_eq!(fetched.file_name, "b.txt");
    assert_eq!(fetched.chunks.len(), 1);
}
