/// Set bit `bit` of `x` on if `toggle` is true, otherwise off.
pub fn bit(bit: u64, x: u64, toggle: bool) -> u64 {
    if toggle {
        x | (1 << bit)
    } else {
        x & !(1 << bit)
    }
}

/// Test whether bit `bit` of `x` is set.
pub fn test_bit(bit: u64, x: u64) -> bool {
    (x >> bit) & 1 == 1
}

/// Return the `u64` datapath identifier of a 6-byte hardware address,
/// occupying the low 48 bits.
pub fn mac_of_bytes(addr: [u8; 6]) -> u64 {
    addr.iter().fold(0u64, |acc, b| acc << 8 | u64::from(*b))
}

/// Forwarding bitmask selecting a single 1-based data port.
pub fn port_mask(port: u32) -> u32 {
    1 << (port - 1)
}

/// Forwarding bitmask for a FLOOD: every data port except the 1-based
/// ingress port. An out-of-range ingress (e.g. the controller pseudo-port)
/// floods to all data ports. Saturates at 32 ports instead of overflowing
/// the shift.
pub fn flood_mask(in_port: u32, data_ports: u32) -> u32 {
    let all = 1u32.checked_shl(data_ports).map_or(u32::MAX, |m| m - 1);
    if in_port >= 1 && in_port <= data_ports {
        all & !port_mask(in_port)
    } else {
        all
    }
}
