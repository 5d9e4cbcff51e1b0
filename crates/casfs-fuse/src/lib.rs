//! # casfs-fuse
//!
//! FUSE mount front-end for CAS-FS (§1, external collaborator). Answers
//! `lookup`/`getattr`/`read`/`readdir` by walking a [`casfs_vfs::CasFs`]
//! tree, eagerly assigning inodes at mount time — no independent inode
//! bookkeeping beyond what `fuser` requires.

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod imp {
    use std::collections::HashMap;
    use std::ffi::OsStr;
    use std::path::Path;
    use std::time::{Duration, UNIX_EPOCH};

    use casfs_codec::{DirEnt, EntryKind};
    use casfs_vfs::CasFs;
    use fuser::{
        FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, Request,
    };
    use libc::{c_int, ENOENT};

    const TTL: Duration = Duration::from_secs(60);
    const BLOCK_SIZE: u64 = 4096;
    const ROOT_INODE: u64 = 1;

    struct InodeEntry {
        entry: DirEnt,
        children: Vec<(String, u64)>,
    }

    /// Mounts a [`CasFs`] tree read-only. Inodes are assigned by an eager
    /// depth-first walk at construction time.
    pub struct CasFsFuse {
        fs: CasFs,
        inodes: HashMap<u64, InodeEntry>,
    }

    impl CasFsFuse {
        pub fn new(mut fs: CasFs) -> anyhow::Result<Self> {
            let root_entry = fs.root_entry().clone();
            let mut inodes = HashMap::new();
            inodes.insert(
                ROOT_INODE,
                InodeEntry { entry: root_entry.clone(), children: Vec::new() },
            );

            let mut next_inode = ROOT_INODE + 1;
            Self::populate(&mut fs, &mut inodes, ROOT_INODE, &root_entry, &mut next_inode)?;
            Ok(CasFsFuse { fs, inodes })
        }

        fn populate(
            fs: &mut CasFs,
            inodes: &mut HashMap<u64, InodeEntry>,
            parent_inode: u64,
            parent_entry: &DirEnt,
            next_inode: &mut u64,
        ) -> anyhow::Result<()> {
            let Some(reference) = parent_entry.reference.clone() else {
                return Ok(());
            };
            let (dir, _format) = fs.get_dir(&reference)?;
            let children: Vec<DirEnt> = dir.entries.clone();

            for child in children {
                let inode = *next_inode;
                *next_inode += 1;
                let name = child.name.to_string_lossy();
                inodes
                    .get_mut(&parent_inode)
                    .expect("parent inode inserted before recursing")
                    .children
                    .push((name, inode));

                let is_dir = child.kind == EntryKind::Dir;
                inodes.insert(inode, InodeEntry { entry: child.clone(), children: Vec::new() });
                if is_dir {
                    Self::populate(fs, inodes, inode, &child, next_inode)?;
                }
            }
            Ok(())
        }

        /// Mount read-only at `mountpoint`, blocking until unmounted.
        pub fn mount(self, mountpoint: &Path) -> anyhow::Result<()> {
            let opts = vec![fuser::MountOption::RO, fuser::MountOption::FSName("casbak".to_string())];
            fuser::mount2(self, mountpoint, &opts)?;
            Ok(())
        }

        fn attr_for(inode: u64, entry: &DirEnt) -> FileAttr {
            let mtime = UNIX_EPOCH + Duration::from_secs(entry.modify_ts.unwrap_or(0).max(0) as u64);
            let size = entry.size.unwrap_or(0);
            FileAttr {
                ino: inode,
                size,
                blocks: size.div_ceil(BLOCK_SIZE),
                atime: mtime,
                mtime,
                ctime: mtime,
                crtime: mtime,
                kind: if entry.kind == EntryKind::Dir { FileType::Directory } else { FileType::RegularFile },
                perm: entry.mode.unwrap_or(0o644) as u16,
                nlink: if entry.kind == EntryKind::Dir { 2 } else { 1 },
                uid: entry.uid.unwrap_or(0),
                gid: entry.gid.unwrap_or(0),
                rdev: 0,
                flags: 0,
                blksize: BLOCK_SIZE as u32,
            }
        }
    }

    impl Filesystem for CasFsFuse {
        fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
            let Some(name_str) = name.to_str() else {
                reply.error(ENOENT);
                return;
            };
            let Some(parent_entry) = self.inodes.get(&parent) else {
                reply.error(ENOENT);
                return;
            };
            for (child_name, child_inode) in &parent_entry.children {
                if child_name == name_str {
                    if let Some(child) = self.inodes.get(child_inode) {
                        reply.entry(&TTL, &Self::attr_for(*child_inode, &child.entry), 0);
                        return;
                    }
                }
            }
            reply.error(ENOENT);
        }

        fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
            match self.inodes.get(&ino) {
                Some(entry) => reply.attr(&TTL, &Self::attr_for(ino, &entry.entry)),
                None => reply.error(ENOENT),
            }
        }

        fn read(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            size: u32,
            _flags: c_int,
            _lock_owner: Option<u64>,
            reply: ReplyData,
        ) {
            let Some(entry) = self.inodes.get(&ino) else {
                reply.error(ENOENT);
                return;
            };
            let Some(reference) = &entry.entry.reference else {
                reply.data(&[]);
                return;
            };
            let hex = reference.to_string_lossy();
            let Some(digest) = self.fs.store().hex_to_digest(&hex) else {
                reply.error(libc::EIO);
                return;
            };
            match self.fs.store().get_bytes(&digest) {
                Ok(data) => {
                    let offset = offset as usize;
                    let size = size as usize;
                    if offset >= data.len() {
                        reply.data(&[]);
                    } else {
                        let end = (offset + size).min(data.len());
                        reply.data(&data[offset..end]);
                    }
                }
                Err(e) => {
                    tracing::error!(ino, error = %e, "CAS read failed");
                    reply.error(libc::EIO);
                }
            }
        }

        fn readdir(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            mut reply: ReplyDirectory,
        ) {
            let Some(entry) = self.inodes.get(&ino) else {
                reply.error(ENOENT);
                return;
            };

            if offset == 0 {
                if reply.add(ino, 0, FileType::Directory, ".") {
                    return;
                }
                if reply.add(ROOT_INODE, 1, FileType::Directory, "..") {
                    return;
                }
            }

            let skip = if offset > 1 { (offset - 2) as usize } else { 0 };
            for (i, (name, child_ino)) in entry.children.iter().enumerate().skip(skip) {
                let child_type = self
                    .inodes
                    .get(child_ino)
                    .map(|e| if e.entry.kind == EntryKind::Dir { FileType::Directory } else { FileType::RegularFile })
                    .unwrap_or(FileType::RegularFile);
                if reply.add(*child_ino, (i + 3) as i64, child_type, name) {
                    break;
                }
            }
            reply.ok();
        }
    }
}

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
mod imp {
    use casfs_vfs::CasFs;

    /// Dummy FUSE filesystem for non-Linux or non-`fuse`-feature builds.
    pub struct CasFsFuse;

    impl CasFsFuse {
        pub fn new(_fs: CasFs) -> anyhow::Result<Self> {
            Ok(CasFsFuse)
        }

        pub fn mount(self, _mountpoint: &std::path::Path) -> anyhow::Result<()> {
            anyhow::bail!("FUSE support is not available on this platform or build (compile with --features fuse on Linux)")
        }
    }
}

pub use imp::CasFsFuse;
