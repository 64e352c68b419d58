//! ISO 9660 directory-tree resolver (component G): recovers a
//! `sector → path` mapping from a data track's Primary Volume
//! Descriptor, used to attribute bad sectors to file paths in
//! extraction reports.

use std::collections::BTreeMap;

use crate::error::RipError;

pub const SECTOR_SIZE: usize = 2048;
const PRIMARY_VOLUME_DESCRIPTOR_SECTOR: i32 = 16;
const ROOT_DIRECTORY_RECORD_OFFSET: usize = 156;
const DIRECTORY_FLAG: u8 = 0x02;

/// One non-root directory entry, keyed by the ISO 9660 logical sector
/// its extent starts at.
#[derive(Debug, Clone)]
pub struct Entry {
    pub identifier: String,
    pub is_directory: bool,
    pub first_sector: i32,
    pub length_bytes: u32,
    /// Identifier chain of every ancestor directory, root excluded.
    pub ancestors: Vec<String>,
}

impl Entry {
    fn sector_count(&self) -> i64 {
        crate::util::idiv_ceil(i64::from(self.length_bytes), SECTOR_SIZE as i64).max(1)
    }

    fn contains(&self, sector: i32) -> bool {
        let start = i64::from(self.first_sector);
        let end = start + self.sector_count();
        (start..end).contains(&i64::from(sector))
    }
}

/// The recovered directory tree, ready for `get_path` lookups.
#[derive(Debug, Clone)]
pub struct FileSystem {
    /// All non-root entries, sorted ascending by `first_sector`.
    entries: Vec<Entry>,
}

fn decode_identifier(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Parses one directory extent (`first_sector`, spanning
/// `ceil(length_bytes / 2048)` sectors) into its child records,
/// skipping "\0"/"\1" self/parent sentinels and honoring zero-length
/// records as an early end-of-sector marker.
fn parse_directory_extent<R>(
    first_sector: i32,
    length_bytes: u32,
    read_sector: &mut R,
) -> Result<Vec<(String, bool, i32, u32)>, RipError>
where
    R: FnMut(i32) -> Result<Vec<u8>, RipError>,
{
    let sector_count = crate::util::idiv_ceil(i64::from(length_bytes), SECTOR_SIZE as i64).max(1);
    let mut records = Vec::new();

    for offset in 0..sector_count {
        let sector_index = first_sector + offset as i32;
        let block = read_sector(sector_index)?;
        let mut pos = 0usize;

        while pos < block.len() {
            let len = block[pos] as usize;
            if len == 0 {
                break;
            }
            if pos + len > block.len() {
                break;
            }

            let extent_sector_le = u32::from_le_bytes(block[pos + 2..pos + 6].try_into().unwrap());
            let data_length_le = u32::from_le_bytes(block[pos + 10..pos + 14].try_into().unwrap());
            let file_flags = block[pos + 25];
            let name_len = block[pos + 32] as usize;
            let name_bytes = &block[pos + 33..pos + 33 + name_len];

            let is_sentinel = name_len == 1 && (name_bytes[0] == 0x00 || name_bytes[0] == 0x01);
            if !is_sentinel {
                records.push((
                    decode_identifier(name_bytes),
                    file_flags & DIRECTORY_FLAG != 0,
                    extent_sector_le as i32,
                    data_length_le,
                ));
            }

            pos += len;
        }
    }

    Ok(records)
}

/// Opens the filesystem by reading the PVD at relative sector 16, then
/// recursively walking the directory tree via `read_sector`.
pub fn open<R>(mut read_sector: R) -> Result<FileSystem, RipError>
where
    R: FnMut(i32) -> Result<Vec<u8>, RipError>,
{
    let pvd = read_sector(PRIMARY_VOLUME_DESCRIPTOR_SECTOR)?;
    if pvd.len() < ROOT_DIRECTORY_RECORD_OFFSET + 34 {
        return Err(RipError::Missing("PVD shorter than the root directory record".into()));
    }

    let root = &pvd[ROOT_DIRECTORY_RECORD_OFFSET..ROOT_DIRECTORY_RECORD_OFFSET + 34];
    let root_extent_sector = u32::from_le_bytes(root[2..6].try_into().unwrap()) as i32;
    let root_length_bytes = u32::from_le_bytes(root[10..14].try_into().unwrap());

    let mut entries = Vec::new();
    // (extent_sector, length_bytes, ancestors-for-children)
    let mut queue = vec![(root_extent_sector, root_length_bytes, Vec::<String>::new())];

    while let Some((extent_sector, length_bytes, ancestors)) = queue.pop() {
        for (identifier, is_directory, child_sector, child_length) in
            parse_directory_extent(extent_sector, length_bytes, &mut read_sector)?
        {
            let entry = Entry {
                identifier: identifier.clone(),
                is_directory,
                first_sector: child_sector,
                length_bytes: child_length,
                ancestors: ancestors.clone(),
            };

            if is_directory {
                let mut child_ancestors = ancestors.clone();
                child_ancestors.push(identifier);
                queue.push((child_sector, child_length, child_ancestors));
            }

            entries.push(entry);
        }
    }

    entries.sort_by_key(|e| e.first_sector);

    Ok(FileSystem { entries })
}

impl FileSystem {
    /// Binary-searches entries for the one whose
    /// `[first_sector, first_sector + ceil(length_bytes/2048))` range
    /// contains `sector`, returning its identifier chain (root and
    /// current/parent sentinels excluded).
    pub fn get_path(&self, sector: i32) -> Option<Vec<String>> {
        let idx = self.entries.partition_point(|e| e.first_sector <= sector).checked_sub(1)?;
        let entry = &self.entries[idx];
        if !entry.contains(sector) {
            return None;
        }

        let mut path = entry.ancestors.clone();
        path.push(entry.identifier.clone());
        Some(path)
    }

    /// Groups bad relative-sector indices by the path they fall under,
    /// for extraction reporting. Sectors that don't resolve to any
    /// entry (lead-in/pregap padding, directory-structure sectors) are
    /// silently dropped from the map.
    pub fn bad_sector_report(&self, bad_sectors: &[i32]) -> BTreeMap<String, Vec<i32>> {
        let mut report: BTreeMap<String, Vec<i32>> = BTreeMap::new();
        for &sector in bad_sectors {
            if let Some(path) = self.get_path(sector) {
                report.entry(path.join("/")).or_default().push(sector);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn directory_record(identifier: &str, is_directory: bool, extent: u32, length: u32) -> Vec<u8> {
        let name = identifier.as_bytes();
        let mut record = vec![0u8; 33 + name.len()];
        record[2..6].copy_from_slice(&extent.to_le_bytes());
        record[6..10].copy_from_slice(&extent.to_be_bytes());
        record[10..14].copy_from_slice(&length.to_le_bytes());
        record[14..18].copy_from_slice(&length.to_be_bytes());
        record[25] = if is_directory { DIRECTORY_FLAG } else { 0 };
        record[32] = name.len() as u8;
        record[33..].copy_from_slice(name);
        record[0] = record.len() as u8;
        if record[0] as usize % 2 != 0 {
            record.push(0);
            record[0] += 1;
        }
        record
    }

    #[test]
    fn recovers_path_for_root_level_file() {
        let mut sectors: HashMap<i32, Vec<u8>> = HashMap::new();

        let mut pvd = vec![0u8; 2048];
        let mut root_record = vec![0u8; 34];
        root_record[2..6].copy_from_slice(&500i32.to_le_bytes());
        root_record[10..14].copy_from_slice(&2048u32.to_le_bytes());
        root_record[25] = DIRECTORY_FLAG;
        root_record[32] = 1;
        pvd[ROOT_DIRECTORY_RECORD_OFFSET..ROOT_DIRECTORY_RECORD_OFFSET + 34].copy_from_slice(&root_record);
        sectors.insert(16, pvd);

        let mut root_dir = vec![0u8; 2048];
        let self_rec = directory_record("\0", true, 500, 2048);
        let parent_rec = directory_record("\u{1}", true, 500, 2048);
        let file_rec = directory_record("DATA;1", false, 1000, 4097);
        let mut pos = 0;
        for rec in [self_rec, parent_rec, file_rec] {
            root_dir[pos..pos + rec.len()].copy_from_slice(&rec);
            pos += rec.len();
        }
        sectors.insert(500, root_dir);

        for s in 1000..1003 {
            sectors.insert(s, vec![0u8; 2048]);
        }

        let fs = open(|sector| {
            sectors
                .get(&sector)
                .cloned()
                .ok_or_else(|| RipError::Missing(format!("no fixture sector {sector}")))
        })
        .unwrap();

        assert_eq!(fs.get_path(1001), Some(vec!["DATA;1".to_string()]));
        assert_eq!(fs.get_path(1003), None);
    }
}
