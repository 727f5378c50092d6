use ipnet::IpNet;

/// Truncates a CIDR to its network address and prints it in canonical form.
/// Anything that doesn't parse is returned trimmed but otherwise untouched,
/// validation reports it later.
pub fn canonical_cidr(cidr: &str) -> String {
    let trimmed = cidr.trim();

    match trimmed.parse::<IpNet>() {
        Ok(net) => net.trunc().to_string(),
        Err(_) => trimmed.to_owned(),
    }
}

pub fn parse_cidr(cidr: &str) -> Option<IpNet> {
    cidr.trim().parse::<IpNet>().ok()
}

pub fn overlaps(left: &IpNet, right: &IpNet) -> bool {
    left.contains(right) || right.contains(left)
}

pub fn is_ipv4(net: &IpNet) -> bool {
    matches!(net, IpNet::V4(_))
}
