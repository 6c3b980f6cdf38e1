// SPDX-License-Identifier: Apache-2.0
// Copyright Multicast Capture Authors

//! One capture run: resource bring-up, the two threads, teardown.

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread;

use args::CmdArgs;
use net::{Endpoint, EndpointError};
use nix::errno::Errno;
use pcap_io::{Writer, WriterError};
use tracing::info;
use verbs::{
    BindError, ChannelError, CmId, CmIdError, CompletionQueue, CqError, EventChannel, Flow,
    FlowError, ModifyError, PostRecvError, ProtectionDomain, PdError, QpCreateError, QueuePair,
};

use crate::chunk::{self, Chunk, ChunkError, SizingError};
use crate::disk::{self, DiskError};
use crate::join::JoinSocket;
use crate::network::{self, NetworkError};
use crate::ring::{Ring, RingStopped};
use crate::signal::{self, SigintGuard};
use crate::stats::Stats;

/// Everything that can end a run early, flattened for the binary.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    #[error(transparent)]
    Sizing(#[from] SizingError),
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    CmId(#[from] CmIdError),
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Pd(#[from] PdError),
    #[error(transparent)]
    Cq(#[from] CqError),
    #[error(transparent)]
    Qp(#[from] QpCreateError),
    #[error(transparent)]
    Modify(#[from] ModifyError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error(transparent)]
    PostRecv(#[from] PostRecvError),
    #[error("ring stopped during setup")]
    Setup(#[from] RingStopped),
    #[error("failed to install SIGINT handler: {0}")]
    Signal(Errno),
    #[error("failed to open multicast join socket: {0}")]
    JoinSocket(Errno),
    #[error("failed to spawn disk thread: {0}")]
    Spawn(std::io::Error),
    #[error("disk thread panicked")]
    DiskPanic,
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Disk(#[from] DiskError),
}

/// Capture until SIGINT or failure; returns the run totals.
pub fn run(args: &CmdArgs) -> Result<Stats, CaptureError> {
    let endpoints = args
        .endpoints()
        .map(Endpoint::from_str)
        .collect::<Result<Vec<_>, _>>()?;
    let sizing = chunk::sizes(args.snaplen(), args.buffer())?;
    info!(
        "capturing {} stream(s): {} chunk(s) of {} record slots",
        endpoints.len(),
        sizing.n_chunks,
        sizing.max_records
    );

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o666)
        .open(args.filename())
        .map_err(|source| CaptureError::Open {
            path: args.filename().to_path_buf(),
            source,
        })?;
    let writer = Writer::new(file, pcap_io::DEFAULT_BUFFER_SIZE, args.sync())?;

    // Locals drop in reverse declaration order, which is exactly the
    // teardown order the verbs layer requires: chunks and rings first, then
    // flows, queue pair, completion queue, protection domain, connection id,
    // event channel.
    let channel = EventChannel::new()?;
    let mut cm = CmId::new(&channel)?;
    cm.bind(args.interface())?;
    let pd = ProtectionDomain::new(&cm)?;
    let cq = CompletionQueue::new(&cm, sizing.n_slots())?;
    let qp = QueuePair::new(&pd, &cq, sizing.n_slots())?;
    qp.to_init(cm.port_num())?;

    let mut flows = Vec::with_capacity(endpoints.len());
    for &endpoint in &endpoints {
        flows.push(Flow::steer(&qp, endpoint, cm.port_num())?);
    }

    let _sigint = SigintGuard::install().map_err(CaptureError::Signal)?;

    let free = Ring::new(sizing.n_chunks);
    let ready = Ring::new(sizing.n_chunks);
    for _ in 0..sizing.n_chunks {
        let mut chunk = Chunk::new(&pd, args.snaplen(), sizing.max_records)?;
        chunk.reset_and_post(&qp)?;
        free.push(chunk)?;
    }
    qp.to_rtr()?;

    let mut stats = Stats::default();
    thread::scope(|s| -> Result<(), CaptureError> {
        let ready_ref = &ready;
        let free_ref = &free;
        let qp_ref = &qp;
        let snaplen = args.snaplen();
        let disk_cpu = args.disk_cpu();
        let handle = thread::Builder::new()
            .name("disk".to_string())
            .spawn_scoped(s, move || {
                disk::run(ready_ref, free_ref, qp_ref, writer, snaplen, disk_cpu)
            })
            .map_err(CaptureError::Spawn)?;

        let join_socket = match JoinSocket::open(args.interface(), &endpoints) {
            Ok(socket) => socket,
            Err(errno) => {
                signal::request_stop();
                ready.stop();
                let _ = handle.join();
                return Err(CaptureError::JoinSocket(errno));
            }
        };

        // The network loop runs inline on the main thread.
        let net_result = network::run(
            &cq,
            &free,
            &ready,
            sizing.max_records,
            &mut stats,
            args.time(),
            args.network_cpu(),
        );
        drop(join_socket);
        let disk_result = match handle.join() {
            Ok(result) => result,
            Err(_) => return Err(CaptureError::DiskPanic),
        };
        net_result?;
        disk_result?;
        Ok(())
    })?;

    Ok(stats)
}
