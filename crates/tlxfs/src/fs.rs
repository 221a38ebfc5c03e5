//! Read-only FUSE surface over the reading cache
//!
//! The mount is a single flat directory: one file per known channel id,
//! named by the decimal id, holding the latest raw value as four uppercase
//! hex digits and a newline. Directory operations lazily start the polling
//! session, so the first `ls` on the mount is what brings the device up.

use std::ffi::OsStr;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyData,
    ReplyDirectory, ReplyEntry, ReplyOpen, Request,
};
use tracing::info;

use crate::session::SessionManager;
use crate::store::Reading;

/// How long the kernel may cache attributes and entries.
const TTL: Duration = Duration::from_secs(1);

const ROOT_INO: u64 = 1;

/// Channel inodes start above the root so channel id 0 stays representable.
const INO_BASE: u64 = 2;

/// Every value file is exactly this long: four hex digits and a newline.
pub const VALUE_LEN: usize = 5;

/// Render a raw value the way consumers read it.
///
/// Negative values show their 16-bit two's-complement pattern; decoding is
/// the consumer's business.
pub fn render_value(raw: i16) -> [u8; VALUE_LEN] {
    let mut out = [0u8; VALUE_LEN];
    let text = format!("{:04X}\n", raw as u16);
    out.copy_from_slice(text.as_bytes());
    out
}

fn ino_for(id: u16) -> u64 {
    INO_BASE + u64::from(id)
}

fn id_for(ino: u64) -> Option<u16> {
    ino.checked_sub(INO_BASE)?.try_into().ok()
}

fn parse_name(name: &OsStr) -> Option<u16> {
    name.to_str()?.parse().ok()
}

/// The filesystem handed to fuser. Holds the session manager and nothing
/// else; all state lives in the reading cache.
pub struct ReadingsFs {
    session: Arc<SessionManager>,
}

impl ReadingsFs {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }

    fn root_attr(&self, req: &Request<'_>) -> FileAttr {
        let created = self.session.first_seen();
        let modified = self.session.last_update();
        FileAttr {
            ino: ROOT_INO,
            size: 0,
            blocks: 0,
            atime: modified,
            mtime: modified,
            ctime: created,
            crtime: created,
            kind: FileType::Directory,
            perm: 0o755,
            nlink: 2,
            uid: req.uid(),
            gid: req.gid(),
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    fn reading_attr(&self, req: &Request<'_>, reading: &Reading) -> FileAttr {
        FileAttr {
            ino: ino_for(reading.id),
            size: VALUE_LEN as u64,
            blocks: 1,
            atime: reading.updated_at,
            mtime: reading.updated_at,
            ctime: reading.created_at,
            crtime: reading.created_at,
            kind: FileType::RegularFile,
            perm: 0o444,
            nlink: 1,
            uid: req.uid(),
            gid: req.gid(),
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

impl Filesystem for ReadingsFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        self.session.ensure_started();
        Ok(())
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent != ROOT_INO {
            reply.error(libc::ENOENT);
            return;
        }
        self.session.ensure_started();

        // Anything that isn't a known channel id, including malformed
        // names, is simply not found.
        match parse_name(name).and_then(|id| self.session.lookup(id)) {
            Some(reading) => reply.entry(&TTL, &self.reading_attr(req, &reading), 0),
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        if ino == ROOT_INO {
            reply.attr(&TTL, &self.root_attr(req));
            return;
        }
        match id_for(ino).and_then(|id| self.session.lookup(id)) {
            Some(reading) => reply.attr(&TTL, &self.reading_attr(req, &reading)),
            None => reply.error(libc::ENOENT),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(libc::EACCES);
            return;
        }
        match id_for(ino).and_then(|id| self.session.lookup(id)) {
            Some(_) => reply.opened(0, 0),
            None => reply.error(libc::ENOENT),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(reading) = id_for(ino).and_then(|id| self.session.lookup(id)) else {
            reply.error(libc::ENOENT);
            return;
        };

        let value = render_value(reading.raw);
        let offset = offset.max(0) as usize;
        if offset >= VALUE_LEN {
            reply.data(&[]);
            return;
        }
        let end = VALUE_LEN.min(offset + size as usize);
        reply.data(&value[offset..end]);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        if ino != ROOT_INO {
            reply.error(libc::ENOTDIR);
            return;
        }
        self.session.ensure_started();

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ROOT_INO, FileType::Directory, ".".to_string()),
            (ROOT_INO, FileType::Directory, "..".to_string()),
        ];
        let mut ids = self.session.ids();
        ids.sort_unstable();
        entries.extend(
            ids.into_iter()
                .map(|id| (ino_for(id), FileType::RegularFile, id.to_string())),
        );

        for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
            // The next offset is one past this entry.
            if reply.add(ino, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }
}

/// Mount the filesystem and block until it is unmounted.
pub fn mount(
    session: Arc<SessionManager>,
    mountpoint: &Path,
    allow_other: bool,
    auto_unmount: bool,
) -> io::Result<()> {
    let mut options = vec![MountOption::RO, MountOption::FSName("tlxfs".to_string())];
    if allow_other {
        options.push(MountOption::AllowOther);
    }
    if auto_unmount {
        options.push(MountOption::AutoUnmount);
    }

    info!("mounting on {}", mountpoint.display());
    fuser::mount2(ReadingsFs::new(session), mountpoint, &options)
}
