use super::{CollectError, NetInterfaces, NetIo};
use sysinfo::Networks;

/// Bytes sent/received since boot, per interface, loopback included.
pub fn collect(nets: &Networks) -> Result<NetInterfaces, CollectError> {
    let out: NetInterfaces = nets
        .iter()
        .map(|(name, data)| {
            (
                name.clone(),
                NetIo {
                    sent_bytes: data.total_transmitted(),
                    recv_bytes: data.total_received(),
                },
            )
        })
        .collect();
    if out.is_empty() {
        return Err(CollectError::Unavailable {
            family: "net",
            reason: "no interfaces listed".into(),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_interfaces_is_unavailable() {
        let err = collect(&Networks::new()).unwrap_err();
        assert_eq!(err.to_string(), "net counters unavailable: no interfaces listed");
    }
}
