//! 内存卷
//!
//! [`Volume`] 的 heapless 内存实现: 有界的文件/目录数量与文件容量，
//! 层级路径，句柄表上限与原实现的 MAX_OPEN_FILE 保持一致 (10)。
//! 在块设备后端的文件系统卷落地之前充当参考卷，也是单元测试的目标卷。

use heapless::{String, Vec};

use super::{DirEntries, DirEntry, FileId, OpenMode, Volume, VolumeUsage};
use crate::config::{MAX_OPEN_FILES, MAX_PATH_LEN, RAM_FILE_CAPACITY, RAM_MAX_DIRS, RAM_MAX_FILES};
use crate::error::StorageError;

type Path = String<MAX_PATH_LEN>;

struct RamFile {
    path: Path,
    data: Vec<u8, RAM_FILE_CAPACITY>,
}

struct OpenFile {
    id: FileId,
    path: Path,
    pos: u32,
    mode: OpenMode,
}

/// 内存卷实现
pub struct RamVolume {
    bound: bool,
    files: Vec<RamFile, RAM_MAX_FILES>,
    dirs: Vec<Path, RAM_MAX_DIRS>,
    open: Vec<OpenFile, MAX_OPEN_FILES>,
    next_id: FileId,
}

impl RamVolume {
    /// 创建未绑定的空卷
    pub const fn new() -> Self {
        Self {
            bound: false,
            files: Vec::new(),
            dirs: Vec::new(),
            open: Vec::new(),
            next_id: 1,
        }
    }

    fn check_bound(&self) -> Result<(), StorageError> {
        if self.bound {
            Ok(())
        } else {
            Err(StorageError::NotInitialized)
        }
    }

    /// 规范化路径: 必须以 `/` 开头，尾部 `/` 被去除 (根目录除外)
    fn normalize(path: &str) -> Result<Path, StorageError> {
        if !path.starts_with('/') {
            return Err(StorageError::InvalidParam);
        }
        let trimmed = if path.len() > 1 {
            path.trim_end_matches('/')
        } else {
            path
        };
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed };

        let mut normalized = Path::new();
        normalized
            .push_str(trimmed)
            .map_err(|_| StorageError::PathTooLong)?;
        Ok(normalized)
    }

    /// 路径的父目录
    fn parent(path: &str) -> &str {
        match path.rfind('/') {
            Some(0) | None => "/",
            Some(i) => &path[..i],
        }
    }

    /// 路径的最后一段
    fn leaf(path: &str) -> &str {
        match path.rfind('/') {
            Some(i) => &path[i + 1..],
            None => path,
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        path == "/" || self.dirs.iter().any(|d| d.as_str() == path)
    }

    fn file_index(&self, path: &str) -> Option<usize> {
        self.files.iter().position(|f| f.path.as_str() == path)
    }

    fn has_children(&self, dir: &str) -> bool {
        self.files.iter().any(|f| Self::parent(&f.path) == dir)
            || self.dirs.iter().any(|d| Self::parent(d) == dir && d.as_str() != dir)
    }

    fn open_entry(&self, file: FileId) -> Result<&OpenFile, StorageError> {
        self.open
            .iter()
            .find(|o| o.id == file)
            .ok_or(StorageError::NotFound)
    }

    fn open_entry_mut(&mut self, file: FileId) -> Result<&mut OpenFile, StorageError> {
        self.open
            .iter_mut()
            .find(|o| o.id == file)
            .ok_or(StorageError::NotFound)
    }
}

impl Volume for RamVolume {
    fn bind(&mut self, _format_on_fail: bool) -> Result<(), StorageError> {
        // 内存卷没有可恢复的持久状态，format_on_fail 无意义
        if self.bound {
            return Err(StorageError::MountFailed);
        }
        self.bound = true;
        Ok(())
    }

    fn unbind(&mut self) -> Result<(), StorageError> {
        self.bound = false;
        self.open.clear();
        Ok(())
    }

    fn usage(&self) -> Result<VolumeUsage, StorageError> {
        self.check_bound()?;
        let used = self.files.iter().map(|f| f.data.len() as u32).sum();
        Ok(VolumeUsage {
            total_bytes: (RAM_MAX_FILES * RAM_FILE_CAPACITY) as u32,
            used_bytes: used,
        })
    }

    fn exists(&self, path: &str) -> bool {
        if !self.bound {
            return false;
        }
        match Self::normalize(path) {
            Ok(p) => self.file_index(&p).is_some() || self.is_dir(&p),
            Err(_) => false,
        }
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<FileId, StorageError> {
        self.check_bound()?;
        let path = Self::normalize(path)?;

        if self.is_dir(&path) {
            return Err(StorageError::WrongType);
        }
        if self.open.is_full() {
            return Err(StorageError::TooManyOpenFiles);
        }

        let index = match (self.file_index(&path), mode) {
            (Some(i), OpenMode::Write) => {
                self.files[i].data.clear();
                i
            }
            (Some(i), _) => i,
            (None, OpenMode::Read) => return Err(StorageError::NotFound),
            (None, OpenMode::Write | OpenMode::Append) => {
                if !self.is_dir(Self::parent(&path)) {
                    return Err(StorageError::NotFound);
                }
                self.files
                    .push(RamFile {
                        path: path.clone(),
                        data: Vec::new(),
                    })
                    .map_err(|_| StorageError::NoSpace)?;
                self.files.len() - 1
            }
        };

        let pos = match mode {
            OpenMode::Append => self.files[index].data.len() as u32,
            _ => 0,
        };

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.open
            .push(OpenFile {
                id,
                path,
                pos,
                mode,
            })
            .map_err(|_| StorageError::TooManyOpenFiles)?;
        Ok(id)
    }

    fn close(&mut self, file: FileId) {
        if let Some(index) = self.open.iter().position(|o| o.id == file) {
            self.open.swap_remove(index);
        }
    }

    fn file_size(&self, file: FileId) -> Result<u32, StorageError> {
        let entry = self.open_entry(file)?;
        let index = self
            .file_index(&entry.path)
            .ok_or(StorageError::NotFound)?;
        Ok(self.files[index].data.len() as u32)
    }

    fn seek(&mut self, file: FileId, pos: u32) -> Result<(), StorageError> {
        let size = self.file_size(file)?;
        if pos > size {
            return Err(StorageError::OutOfRange);
        }
        self.open_entry_mut(file)?.pos = pos;
        Ok(())
    }

    fn read_byte(&mut self, file: FileId) -> Result<Option<u8>, StorageError> {
        let entry = self.open_entry(file)?;
        let pos = entry.pos as usize;
        let index = self
            .file_index(&entry.path)
            .ok_or(StorageError::NotFound)?;

        let byte = self.files[index].data.get(pos).copied();
        if byte.is_some() {
            self.open_entry_mut(file)?.pos += 1;
        }
        Ok(byte)
    }

    fn write(&mut self, file: FileId, data: &[u8]) -> Result<(), StorageError> {
        let entry = self.open_entry(file)?;
        if entry.mode == OpenMode::Read {
            return Err(StorageError::InvalidParam);
        }
        let mut pos = entry.pos as usize;
        let index = self
            .file_index(&entry.path)
            .ok_or(StorageError::NotFound)?;

        if pos + data.len() > RAM_FILE_CAPACITY {
            return Err(StorageError::NoSpace);
        }
        for &byte in data {
            if pos < self.files[index].data.len() {
                self.files[index].data[pos] = byte;
            } else {
                self.files[index]
                    .data
                    .push(byte)
                    .map_err(|_| StorageError::NoSpace)?;
            }
            pos += 1;
        }
        self.open_entry_mut(file)?.pos = pos as u32;
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> Result<(), StorageError> {
        self.check_bound()?;
        let path = Self::normalize(path)?;

        if self.is_dir(&path) || self.file_index(&path).is_some() {
            return Err(StorageError::AlreadyExists);
        }
        if !self.is_dir(Self::parent(&path)) {
            return Err(StorageError::NotFound);
        }
        self.dirs.push(path).map_err(|_| StorageError::NoSpace)?;
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> Result<(), StorageError> {
        self.check_bound()?;
        let path = Self::normalize(path)?;

        if path == "/" {
            return Err(StorageError::InvalidParam);
        }
        let Some(index) = self.dirs.iter().position(|d| d.as_str() == path.as_str()) else {
            if self.file_index(&path).is_some() {
                return Err(StorageError::WrongType);
            }
            return Err(StorageError::NotFound);
        };
        if self.has_children(&path) {
            return Err(StorageError::DirectoryNotEmpty);
        }
        self.dirs.swap_remove(index);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        self.check_bound()?;
        let path = Self::normalize(path)?;

        if self.is_dir(&path) {
            return Err(StorageError::WrongType);
        }
        let index = self.file_index(&path).ok_or(StorageError::NotFound)?;
        self.files.swap_remove(index);
        Ok(())
    }

    fn read_dir(&mut self, path: &str, entries: &mut DirEntries) -> Result<(), StorageError> {
        self.check_bound()?;
        let path = Self::normalize(path)?;

        if self.file_index(&path).is_some() {
            return Err(StorageError::WrongType);
        }
        if !self.is_dir(&path) {
            return Err(StorageError::NotFound);
        }

        for dir in &self.dirs {
            if Self::parent(dir) == path.as_str() && dir.as_str() != path.as_str() {
                let mut name = String::new();
                name.push_str(Self::leaf(dir))
                    .map_err(|_| StorageError::PathTooLong)?;
                entries
                    .push(DirEntry {
                        name,
                        is_dir: true,
                        size: 0,
                    })
                    .map_err(|_| StorageError::NoSpace)?;
            }
        }
        for file in &self.files {
            if Self::parent(&file.path) == path.as_str() {
                let mut name = String::new();
                name.push_str(Self::leaf(&file.path))
                    .map_err(|_| StorageError::PathTooLong)?;
                entries
                    .push(DirEntry {
                        name,
                        is_dir: false,
                        size: file.data.len() as u32,
                    })
                    .map_err(|_| StorageError::NoSpace)?;
            }
        }
        Ok(())
    }
}

impl Default for RamVolume {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound() -> RamVolume {
        let mut vol = RamVolume::new();
        vol.bind(false).ok();
        vol
    }

    #[test]
    fn test_requires_bind() {
        let mut vol = RamVolume::new();
        assert_eq!(
            vol.open("/a.txt", OpenMode::Write).err(),
            Some(StorageError::NotInitialized)
        );
        assert!(!vol.exists("/"));
    }

    #[test]
    fn test_double_bind_fails() {
        let mut vol = bound();
        assert_eq!(vol.bind(false).err(), Some(StorageError::MountFailed));
    }

    #[test]
    fn test_write_then_read() {
        let mut vol = bound();
        let f = vol.open("/a.txt", OpenMode::Write).unwrap();
        vol.write(f, b"hi").unwrap();
        vol.close(f);

        let f = vol.open("/a.txt", OpenMode::Read).unwrap();
        assert_eq!(vol.file_size(f), Ok(2));
        assert_eq!(vol.read_byte(f), Ok(Some(b'h')));
        assert_eq!(vol.read_byte(f), Ok(Some(b'i')));
        assert_eq!(vol.read_byte(f), Ok(None));
        vol.close(f);
    }

    #[test]
    fn test_append_positions_at_end() {
        let mut vol = bound();
        let f = vol.open("/a.txt", OpenMode::Write).unwrap();
        vol.write(f, b"ab").unwrap();
        vol.close(f);

        let f = vol.open("/a.txt", OpenMode::Append).unwrap();
        vol.write(f, b"cd").unwrap();
        vol.close(f);

        let f = vol.open("/a.txt", OpenMode::Read).unwrap();
        assert_eq!(vol.file_size(f), Ok(4));
        vol.close(f);
    }

    #[test]
    fn test_write_truncates() {
        let mut vol = bound();
        let f = vol.open("/a.txt", OpenMode::Write).unwrap();
        vol.write(f, b"long content").unwrap();
        vol.close(f);

        let f = vol.open("/a.txt", OpenMode::Write).unwrap();
        vol.write(f, b"x").unwrap();
        vol.close(f);

        let f = vol.open("/a.txt", OpenMode::Read).unwrap();
        assert_eq!(vol.file_size(f), Ok(1));
        vol.close(f);
    }

    #[test]
    fn test_open_missing_read() {
        let mut vol = bound();
        assert_eq!(
            vol.open("/nope", OpenMode::Read).err(),
            Some(StorageError::NotFound)
        );
    }

    #[test]
    fn test_open_dir_as_file() {
        let mut vol = bound();
        vol.mkdir("/logs").unwrap();
        assert_eq!(
            vol.open("/logs", OpenMode::Read).err(),
            Some(StorageError::WrongType)
        );
    }

    #[test]
    fn test_seek_bounds() {
        let mut vol = bound();
        let f = vol.open("/a.txt", OpenMode::Write).unwrap();
        vol.write(f, b"abc").unwrap();
        vol.close(f);

        let f = vol.open("/a.txt", OpenMode::Read).unwrap();
        assert!(vol.seek(f, 3).is_ok());
        assert_eq!(vol.seek(f, 4).err(), Some(StorageError::OutOfRange));
        vol.close(f);
    }

    #[test]
    fn test_mkdir_hierarchy() {
        let mut vol = bound();
        assert!(vol.mkdir("/a").is_ok());
        assert!(vol.mkdir("/a/b").is_ok());
        // 父目录不存在
        assert_eq!(vol.mkdir("/x/y").err(), Some(StorageError::NotFound));
        // 已存在
        assert_eq!(vol.mkdir("/a").err(), Some(StorageError::AlreadyExists));
    }

    #[test]
    fn test_rmdir_non_empty() {
        let mut vol = bound();
        vol.mkdir("/a").unwrap();
        let f = vol.open("/a/file", OpenMode::Write).unwrap();
        vol.close(f);

        assert_eq!(vol.rmdir("/a").err(), Some(StorageError::DirectoryNotEmpty));
        vol.remove("/a/file").unwrap();
        assert!(vol.rmdir("/a").is_ok());
        assert!(!vol.exists("/a"));
    }

    #[test]
    fn test_remove_dir_is_wrong_type() {
        let mut vol = bound();
        vol.mkdir("/a").unwrap();
        assert_eq!(vol.remove("/a").err(), Some(StorageError::WrongType));
    }

    #[test]
    fn test_read_dir_lists_children() {
        let mut vol = bound();
        vol.mkdir("/a").unwrap();
        vol.mkdir("/a/sub").unwrap();
        let f = vol.open("/a/file", OpenMode::Write).unwrap();
        vol.write(f, b"xyz").unwrap();
        vol.close(f);

        let mut entries = DirEntries::new();
        vol.read_dir("/a", &mut entries).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.name.as_str() == "sub" && e.is_dir));
        assert!(entries
            .iter()
            .any(|e| e.name.as_str() == "file" && e.is_file() && e.size == 3));
    }

    #[test]
    fn test_open_handle_limit() {
        let mut vol = bound();
        let mut handles: heapless::Vec<FileId, MAX_OPEN_FILES> = heapless::Vec::new();
        for i in 0..MAX_OPEN_FILES {
            let mut path: Path = String::new();
            path.push('/').ok();
            path.push((b'a' + i as u8) as char).ok();
            handles.push(vol.open(&path, OpenMode::Write).unwrap()).ok();
        }
        assert_eq!(
            vol.open("/overflow", OpenMode::Write).err(),
            Some(StorageError::TooManyOpenFiles)
        );
        for h in handles {
            vol.close(h);
        }
    }
}
