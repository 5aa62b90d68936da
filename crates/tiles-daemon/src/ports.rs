//! Listening-socket inventory for `GET /ports`.
//!
//! Two [`SocketLister`]s exist: the procfs one (pid and process name
//! included) and a `netstat` fallback that only yields port numbers. The
//! scanner probes procfs once at startup and falls back per request when a
//! lister errors.

use anyhow::Context;
use futures_util::future::BoxFuture;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tiles_proto::config::PortsConfig;
use tiles_proto::protocol::{PortEntry, PortReport, PortSource};
use tracing::{debug, info, warn};

/// Hex state code of a listening socket in `/proc/net/tcp*`.
const TCP_LISTEN: &str = "0A";

/// Substrings marking a listening line in `netstat` output. `LISTENING`
/// (Windows) is covered by `LISTEN`; `Ascolto` is the Italian locale.
const LISTEN_MARKERS: [&str; 2] = ["LISTEN", "Ascolto"];

pub trait SocketLister: Send + Sync {
    fn source(&self) -> PortSource;

    /// Listening sockets, deduplicated and sorted by port.
    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<PortEntry>>>;
}

// ── procfs ────────────────────────────────────────────────────────────────────

pub struct ProcNetLister {
    root: PathBuf,
}

impl ProcNetLister {
    pub fn new() -> Self {
        Self::with_root(PathBuf::from("/proc"))
    }

    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn is_available(&self) -> bool {
        std::fs::File::open(self.root.join("net/tcp")).is_ok()
    }
}

impl SocketLister for ProcNetLister {
    fn source(&self) -> PortSource {
        PortSource::Primary
    }

    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<PortEntry>>> {
        let root = self.root.clone();
        Box::pin(async move { tokio::task::spawn_blocking(move || scan_procfs(&root)).await? })
    }
}

fn scan_procfs(root: &Path) -> anyhow::Result<Vec<PortEntry>> {
    let tcp = std::fs::read_to_string(root.join("net/tcp"))
        .with_context(|| format!("cannot read {:?}", root.join("net/tcp")))?;
    let mut listening = parse_proc_net(&tcp);
    // IPv6 may be compiled out
    if let Ok(tcp6) = std::fs::read_to_string(root.join("net/tcp6")) {
        listening.extend(parse_proc_net(&tcp6));
    }

    let owners = socket_owners(root);
    let names = process_names(owners.values().copied());

    let mut unique: BTreeMap<(u16, Option<u32>), PortEntry> = BTreeMap::new();
    for (port, inode) in listening {
        let pid = owners.get(&inode).copied();
        let proc = pid.and_then(|p| names.get(&p).cloned());
        unique.insert((port, pid), PortEntry { port, pid, proc });
    }
    Ok(unique.into_values().collect())
}

/// `(port, inode)` of every listening row in a `/proc/net/tcp`-style table.
pub fn parse_proc_net(table: &str) -> Vec<(u16, u64)> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 10 || fields[3] != TCP_LISTEN {
                return None;
            }
            let (_, port_hex) = fields[1].rsplit_once(':')?;
            let port = u16::from_str_radix(port_hex, 16).ok()?;
            let inode = fields[9].parse::<u64>().ok()?;
            Some((port, inode))
        })
        .collect()
}

/// Socket inode → owning pid, from `/proc/<pid>/fd` links. Processes whose
/// fds we may not read are skipped, which is why this path wants privileges.
fn socket_owners(root: &Path) -> HashMap<u64, u32> {
    let mut owners = HashMap::new();
    let Ok(entries) = std::fs::read_dir(root) else {
        return owners;
    };

    for entry in entries.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
            continue;
        };
        for fd in fds.flatten() {
            let Ok(target) = std::fs::read_link(fd.path()) else {
                continue;
            };
            if let Some(inode) = socket_inode(&target.to_string_lossy()) {
                owners.entry(inode).or_insert(pid);
            }
        }
    }
    owners
}

fn socket_inode(link: &str) -> Option<u64> {
    link.strip_prefix("socket:[")?
        .strip_suffix(']')?
        .parse()
        .ok()
}

fn process_names(pids: impl Iterator<Item = u32>) -> HashMap<u32, String> {
    let pids: Vec<Pid> = pids.collect::<BTreeSet<_>>().into_iter().map(Pid::from_u32).collect();
    if pids.is_empty() {
        return HashMap::new();
    }

    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&pids), true);
    pids.iter()
        .filter_map(|pid| {
            let process = sys.process(*pid)?;
            Some((pid.as_u32(), process.name().to_string_lossy().into_owned()))
        })
        .collect()
}

// ── netstat fallback ──────────────────────────────────────────────────────────

pub struct NetstatLister {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl NetstatLister {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    #[cfg(windows)]
    pub fn platform_default(timeout: Duration) -> Self {
        Self::new("netstat", vec!["-ano".to_string()], timeout)
    }

    #[cfg(not(windows))]
    pub fn platform_default(timeout: Duration) -> Self {
        Self::new(
            "sh",
            vec!["-lc".to_string(), "netstat -tulnp | cat".to_string()],
            timeout,
        )
    }

    async fn run(&self) -> anyhow::Result<String> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.timeout, output)
            .await
            .with_context(|| format!("{} timed out after {:?}", self.program, self.timeout))?
            .with_context(|| format!("failed to run {}", self.program))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            anyhow::bail!("{} exited with {}: {}", self.program, output.status, text.trim());
        }
        Ok(text)
    }
}

impl SocketLister for NetstatLister {
    fn source(&self) -> PortSource {
        PortSource::FallbackShell
    }

    fn list(&self) -> BoxFuture<'_, anyhow::Result<Vec<PortEntry>>> {
        Box::pin(async move {
            let text = self.run().await?;
            Ok(parse_netstat_output(&text)
                .into_iter()
                .map(PortEntry::port_only)
                .collect())
        })
    }
}

/// Distinct listening ports in `netstat` output, ascending.
pub fn parse_netstat_output(text: &str) -> Vec<u16> {
    let mut ports = BTreeSet::new();
    for line in text.lines() {
        if !LISTEN_MARKERS.iter().any(|m| line.contains(m)) {
            continue;
        }
        for field in line.split_whitespace() {
            let Some((_, tail)) = field.rsplit_once(':') else {
                continue;
            };
            // Windows prints the foreign side of a listener as 0.0.0.0:0
            if let Ok(port) = tail.parse::<u16>() {
                if port != 0 {
                    ports.insert(port);
                }
            }
        }
    }
    ports.into_iter().collect()
}

// ── scanner ───────────────────────────────────────────────────────────────────

pub struct PortScanner {
    listers: Vec<Box<dyn SocketLister>>,
}

impl PortScanner {
    pub fn new(listers: Vec<Box<dyn SocketLister>>) -> Self {
        Self { listers }
    }

    /// procfs when readable, then the platform's netstat.
    pub fn detect(config: &PortsConfig) -> Self {
        let mut listers: Vec<Box<dyn SocketLister>> = Vec::new();
        let procfs = ProcNetLister::new();
        if procfs.is_available() {
            info!("ports: using procfs with netstat fallback");
            listers.push(Box::new(procfs));
        } else {
            info!("ports: procfs unavailable, using netstat only");
        }
        listers.push(Box::new(NetstatLister::platform_default(Duration::from_secs(
            config.command_timeout_secs,
        ))));
        Self::new(listers)
    }

    pub async fn report(&self) -> PortReport {
        let mut last_error = None;
        for lister in &self.listers {
            match lister.list().await {
                Ok(ports) => {
                    debug!("ports: {} listening via {:?}", ports.len(), lister.source());
                    return PortReport::listed(ports, lister.source());
                }
                Err(e) => {
                    warn!("ports: {:?} lister failed: {:#}", lister.source(), e);
                    last_error = Some(format!("{:#}", e));
                }
            }
        }
        PortReport::failed(last_error.unwrap_or_else(|| "no port lister available".to_string()))
    }
}
