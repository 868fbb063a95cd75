use ipnet::IpNet;

/// Compares two policies' destination sets to decide ordering within a scope:
/// the policy with the more specific destination prefix sorts first.
///
/// This mirrors a documented quirk of the reference implementation (§9 open
/// question 1): the inner loop does not short-circuit, so when a policy's
/// `dest` set has more than one entry, only the *last* compared pair decides
/// the verdict. That is intentional fidelity to the reference behavior, not a
/// bug to be fixed here.
///
/// Returns `true` when `a` should sort before `b` (i.e. `a` is considered
/// more specific, or wins the tie-break).
pub fn a_sorts_before_b(a_dest: &[IpNet], b_dest: &[IpNet]) -> bool {
    let mut before = true;
    for a in a_dest {
        for b in b_dest {
            before = if a.contains(&b.addr()) {
                // b is more specific than a: a does not sort before b.
                false
            } else if b.contains(&a.addr()) {
                // a is more specific than b: a sorts before b.
                true
            } else {
                // Disjoint prefixes: tie-break in favor of a.
                true
            };
        }
    }
    before
}

/// Parses a destination entry the way the policy cache stores it: bare IPv4
/// addresses are treated as `/32`.
pub fn parse_dest(s: &str) -> Option<IpNet> {
    if let Ok(net) = s.parse::<IpNet>() {
        return Some(net);
    }
    let addr: std::net::Ipv4Addr = s.parse().ok()?;
    Some(IpNet::new(addr.into(), 32).expect("/32 is always valid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nets(strs: &[&str]) -> Vec<IpNet> {
        strs.iter().map(|s| parse_dest(s).unwrap()).collect()
    }

    #[test]
    fn more_specific_sorts_first() {
        let default_route = nets(&["0.0.0.0/0"]);
        let narrow = nets(&["10.0.0.0/8"]);
        // default_route (A) vs narrow (B): narrow is more specific, so A
        // does not sort before B.
        assert!(!a_sorts_before_b(&default_route, &narrow));
        // Symmetric: narrow (A) vs default_route (B): A is more specific.
        assert!(a_sorts_before_b(&narrow, &default_route));
    }

    #[test]
    fn disjoint_prefixes_tie_break_in_favor_of_a() {
        let a = nets(&["10.0.0.0/8"]);
        let b = nets(&["192.168.0.0/16"]);
        assert!(a_sorts_before_b(&a, &b));
    }

    #[test]
    fn bare_ipv4_is_treated_as_slash_32() {
        let net = parse_dest("10.0.0.1").unwrap();
        assert_eq!(net.prefix_len(), 32);
    }

    #[test]
    fn last_pair_wins_when_multiple_entries() {
        // a has two entries: one narrower than b, one that is disjoint.
        // The verdict from the *last* entry pair must win, per the
        // documented quirk.
        let a = nets(&["10.0.0.0/8", "192.168.0.0/16"]);
        let b = nets(&["192.168.1.0/24"]);
        // Last pair: a[1]=192.168.0.0/16 vs b[0]=192.168.1.0/24: a contains
        // b's address, so b is more specific => a does not sort before b.
        assert!(!a_sorts_before_b(&a, &b));
    }
}
