use std::{io, mem};

use rama::telemetry::tracing;

pub use libc::rlim_t;

/// Raise the soft limit of open file descriptors to `target`,
/// capped by the hard limit. A limit that is already high enough is kept.
///
/// Each buffalo can keep pooled sockets open, so big stampedes
/// easily run into the (often low) default soft limit.
pub fn raise_nofile(target: rlim_t) -> io::Result<()> {
    // SAFETY: rlimit is a plain C struct, zeroed is a valid value,
    // and it is only passed by pointer to getrlimit/setrlimit.
    let mut lim: libc::rlimit = unsafe { mem::zeroed() };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut lim) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let Some(new_soft) = next_soft_limit(lim.rlim_cur, lim.rlim_max, target) else {
        tracing::info!(
            "ulimit: keep current soft limit ({}), requested {target}: nothing to do",
            lim.rlim_cur,
        );
        return Ok(());
    };

    let previous = lim.rlim_cur;
    lim.rlim_cur = new_soft;
    if unsafe { libc::setrlimit(libc::RLIMIT_NOFILE, &lim) } != 0 {
        return Err(io::Error::last_os_error());
    }

    tracing::info!("ulimit: applied new soft limit ({new_soft}); previous value = {previous}");
    Ok(())
}

fn next_soft_limit(current: rlim_t, hard: rlim_t, target: rlim_t) -> Option<rlim_t> {
    let new_soft = target.min(hard);
    (current < new_soft).then_some(new_soft)
}
