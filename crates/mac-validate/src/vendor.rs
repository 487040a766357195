//! OUI vendor table and address generation

use rand::seq::SliceRandom;
use rand::Rng;

use macshift_core::error::ValidationError;
use macshift_core::MacAddr;

use crate::syntax::normalize;

/// Label reported for addresses whose OUI is not in the table
pub const UNKNOWN_VENDOR: &str = "Unknown/Generic Vendor";

/// Known vendor prefixes used for lookup and realistic generation
pub const KNOWN_OUIS: &[(&str, &str)] = &[
    ("00:25:86", "Intel Corporate"),
    ("00:1A:A0", "Intel"),
    ("00:0D:B9", "Intel"),
    ("00:19:B9", "Intel"),
    ("00:23:14", "Intel"),
    ("A8:5E:45", "Intel"),
    ("00:E0:4C", "Realtek"),
    ("00:50:F2", "Realtek"),
    ("74:DA:38", "Realtek"),
    ("00:10:18", "Broadcom"),
    ("00:04:75", "Broadcom"),
    ("00:0B:85", "Broadcom"),
    ("BC:92:6B", "Broadcom"),
    ("00:03:7F", "Atheros"),
    ("00:30:B6", "Atheros"),
    ("00:11:95", "Atheros"),
    ("1C:7E:E5", "Atheros"),
    ("00:1A:B3", "Qualcomm"),
    ("00:11:50", "Qualcomm"),
    ("00:12:D9", "Cisco"),
    ("00:1F:CA", "Cisco"),
    ("00:0C:41", "Cisco"),
    ("00:1A:6C", "Cisco"),
    ("2C:B0:5D", "Cisco"),
    ("00:03:93", "Apple"),
    ("00:0A:95", "Apple"),
    ("A4:5E:60", "Apple"),
    ("AC:87:A3", "Apple"),
    ("C0:A0:BB", "Apple"),
    ("F0:18:98", "Apple"),
    ("00:14:22", "Dell"),
    ("00:01:AF", "Dell"),
    ("00:16:35", "Dell"),
    ("50:9A:4C", "Dell"),
    ("00:04:EA", "HP"),
    ("00:1A:4B", "HP"),
    ("00:30:EA", "HP"),
    ("50:E5:49", "HP"),
    ("00:1A:2B", "Lenovo"),
    ("00:21:6A", "Lenovo"),
    ("28:F1:0E", "Lenovo"),
    ("00:02:2D", "IBM"),
    ("00:05:5B", "IBM"),
    ("00:04:AC", "IBM"),
    ("00:15:5D", "Microsoft"),
    ("00:0C:29", "VMware"),
    ("52:54:00", "QEMU/KVM"),
    ("52:55:44", "QEMU"),
    ("00:1A:92", "ASUS"),
    ("BC:5F:F4", "ASUS"),
    ("04:18:D6", "TP-Link"),
    ("5C:F3:70", "TP-Link"),
    ("00:15:E9", "D-Link"),
    ("00:26:86", "D-Link"),
    ("00:13:10", "Linksys"),
    ("00:18:E7", "Linksys"),
    ("00:01:03", "3Com"),
    ("00:60:97", "3Com"),
    ("00:00:4E", "NEC"),
    ("00:A0:DE", "NEC"),
    ("00:0A:FD", "Panasonic"),
    ("08:ED:B7", "Panasonic"),
    ("00:06:6B", "Sony"),
    ("00:1F:3B", "Sony"),
    ("00:1A:8A", "Samsung"),
    ("E0:55:3D", "Samsung"),
    ("00:1E:8F", "LG"),
    ("AC:64:17", "LG"),
    ("00:0C:6E", "Toshiba"),
    ("F8:34:41", "Toshiba"),
    ("00:1A:43", "Canon"),
    ("B0:35:9F", "Canon"),
    ("00:00:93", "Xerox"),
    ("00:11:09", "Xerox"),
    ("00:0D:FE", "Epson"),
    ("00:AC:E2", "Epson"),
    ("00:11:22", "Generic Device"),
    ("00:AA:BB", "Generic Device"),
    ("02:00:00", "Generic Unicast"),
];

/// Vendor registered for the address' OUI
pub fn vendor_for(mac: &MacAddr) -> Option<&'static str> {
    let oui = mac.oui();
    KNOWN_OUIS
        .iter()
        .find(|(prefix, _)| *prefix == oui)
        .map(|(_, vendor)| *vendor)
}

/// Parse a vendor prefix given in any supported notation, e.g. `00-25-86`
pub fn parse_oui(prefix: &str) -> Result<[u8; 3], ValidationError> {
    let hex = normalize(prefix).replace(':', "");
    let invalid = || ValidationError::InvalidFormat {
        value: prefix.to_string(),
    };

    if hex.len() != 6 {
        return Err(invalid());
    }

    let mut oui = [0u8; 3];
    for (i, octet) in oui.iter_mut().enumerate() {
        *octet = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
    }
    Ok(oui)
}

/// Address with a known vendor prefix (or `vendor_prefix`) and a random
/// host part. Always unicast.
pub fn generate_realistic(
    rng: &mut impl Rng,
    vendor_prefix: Option<&str>,
) -> Result<MacAddr, ValidationError> {
    let oui = match vendor_prefix {
        Some(prefix) => parse_oui(prefix)?,
        None => {
            let (prefix, _) = KNOWN_OUIS
                .choose(rng)
                .copied()
                .unwrap_or(("02:00:00", "Generic Unicast"));
            parse_oui(prefix)?
        }
    };

    let mut octets = [oui[0] & !0x01, oui[1], oui[2], 0, 0, 0];
    rng.fill(&mut octets[3..]);
    Ok(MacAddr::new(octets))
}

/// Fully random unicast address
pub fn generate_random(rng: &mut impl Rng) -> MacAddr {
    let mut octets = [0u8; 6];
    rng.fill(&mut octets[..]);
    octets[0] &= !0x01;
    MacAddr::new(octets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_vendor_lookup() {
        let intel: MacAddr = "00:25:86:12:34:56".parse().unwrap();
        assert_eq!(vendor_for(&intel), Some("Intel Corporate"));

        let kvm: MacAddr = "52:54:00:12:34:56".parse().unwrap();
        assert_eq!(vendor_for(&kvm), Some("QEMU/KVM"));

        let unknown: MacAddr = "0E:AB:CD:12:34:56".parse().unwrap();
        assert_eq!(vendor_for(&unknown), None);
    }

    #[test]
    fn test_parse_oui_notations() {
        assert_eq!(parse_oui("00:25:86").unwrap(), [0x00, 0x25, 0x86]);
        assert_eq!(parse_oui("00-25-86").unwrap(), [0x00, 0x25, 0x86]);
        assert_eq!(parse_oui("a85e45").unwrap(), [0xA8, 0x5E, 0x45]);
        assert!(parse_oui("00:25").is_err());
        assert!(parse_oui("ZZ:25:86").is_err());
    }

    #[test]
    fn test_realistic_generation_uses_known_prefix() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..32 {
            let mac = generate_realistic(&mut rng, None).unwrap();
            assert!(mac.is_unicast());
            assert!(vendor_for(&mac).is_some(), "unexpected prefix {}", mac);
        }
    }

    #[test]
    fn test_realistic_generation_with_prefix() {
        let mut rng = StdRng::seed_from_u64(7);
        let mac = generate_realistic(&mut rng, Some("00:0C:29")).unwrap();
        assert_eq!(mac.oui(), "00:0C:29");

        // multicast bit of a supplied prefix is cleared
        let mac = generate_realistic(&mut rng, Some("01:00:5E")).unwrap();
        assert!(mac.is_unicast());
        assert_eq!(mac.oui(), "00:00:5E");
    }

    #[test]
    fn test_random_generation_is_unicast() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..64 {
            assert!(generate_random(&mut rng).is_unicast());
        }
    }
}
