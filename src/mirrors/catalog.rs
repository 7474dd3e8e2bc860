//! The fixed worldwide mirror catalog.

/// A mirror as listed in the catalog. `url` is a pacman `Server` template
/// with `$repo` and `$arch` placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorEntry {
    pub name: &'static str,
    pub url: &'static str,
}

impl MirrorEntry {
    pub const fn new(name: &'static str, url: &'static str) -> Self {
        Self { name, url }
    }

    /// The small index file probed to measure latency.
    pub fn test_url(&self) -> String {
        format!(
            "{}/core.db",
            self.url.replace("$repo", "core").replace("$arch", "x86_64")
        )
    }
}

/// Used when no mirror has been selected or tested.
pub const DEFAULT_MIRROR: &str = "https://geo.mirror.pkgbuild.com/$repo/os/$arch";

pub const WORLDWIDE_MIRRORS: &[MirrorEntry] = &[
    // North America
    MirrorEntry::new(
        "US Rackspace (Texas)",
        "https://mirror.rackspace.com/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new("US MIT (Massachusetts)", "https://mirrors.mit.edu/archlinux/$repo/os/$arch"),
    MirrorEntry::new(
        "US Kernel.org (California)",
        "https://mirrors.kernel.org/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new(
        "US Georgia Tech",
        "https://www.gtlib.gatech.edu/pub/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new("US University of Utah", "https://arch.mirror.constant.com/$repo/os/$arch"),
    MirrorEntry::new(
        "CA University of Waterloo",
        "https://mirror.csclub.uwaterloo.ca/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new(
        "CA Carleton University",
        "https://mirror.carleton.ca/archlinux/$repo/os/$arch",
    ),
    // Europe
    MirrorEntry::new("DE rwth-aachen.de", "https://mirror.rwth-aachen.de/archlinux/$repo/os/$arch"),
    MirrorEntry::new("DE FAU Erlangen", "https://ftp.fau.de/archlinux/$repo/os/$arch"),
    MirrorEntry::new(
        "DE TU Chemnitz",
        "https://ftp.tu-chemnitz.de/pub/linux/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new("FR Ircam", "https://mirrors.ircam.fr/pub/archlinux/$repo/os/$arch"),
    MirrorEntry::new(
        "FR Telecom ParisTech",
        "https://mirror.telepoint.bg/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new(
        "GB University of Cambridge",
        "https://www.mirrorservice.org/sites/ftp.archlinux.org/$repo/os/$arch",
    ),
    MirrorEntry::new("GB Bytemark", "https://lon.mirror.rackspace.com/archlinux/$repo/os/$arch"),
    MirrorEntry::new("NL Nluug", "https://ftp.nluug.nl/os/Linux/distr/archlinux/$repo/os/$arch"),
    MirrorEntry::new("NL Leaseweb", "https://mirror.leaseweb.com/archlinux/$repo/os/$arch"),
    MirrorEntry::new("SE Lysator", "https://ftp.lysator.liu.se/pub/archlinux/$repo/os/$arch"),
    MirrorEntry::new(
        "NO University of Oslo",
        "https://mirrors.dotsrc.org/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new(
        "CH Switch.ch",
        "https://mirror.switch.ch/ftp/mirror/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new(
        "IT Garr",
        "https://archlinux.mirror.garr.it/mirrors/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new("ES RedIRIS", "https://ftp.rediris.es/mirror/archlinux/$repo/os/$arch"),
    // Asia-Pacific
    MirrorEntry::new("JP JAIST", "https://ftp.jaist.ac.jp/pub/Linux/ArchLinux/$repo/os/$arch"),
    MirrorEntry::new(
        "JP Tsukuba University",
        "https://ftp.tsukuba.wide.ad.jp/Linux/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new("KR KAIST", "https://ftp.kaist.ac.kr/ArchLinux/$repo/os/$arch"),
    MirrorEntry::new(
        "CN Tsinghua University",
        "https://mirrors.tuna.tsinghua.edu.cn/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new("CN USTC", "https://mirrors.ustc.edu.cn/archlinux/$repo/os/$arch"),
    MirrorEntry::new(
        "SG National University",
        "https://download.nus.edu.sg/mirror/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new("AU AARNet", "https://mirror.aarnet.edu.au/pub/archlinux/$repo/os/$arch"),
    MirrorEntry::new(
        "AU Internode",
        "https://mirror.internode.on.net/pub/archlinux/$repo/os/$arch",
    ),
    MirrorEntry::new(
        "IN Indian Institute of Technology",
        "https://mirror.cse.iitk.ac.in/archlinux/$repo/os/$arch",
    ),
    // South America
    MirrorEntry::new(
        "BR University of Sao Paulo",
        "https://br.mirror.archlinux-br.org/$repo/os/$arch",
    ),
    MirrorEntry::new("BR C3SL UFPR", "https://archlinux.c3sl.ufpr.br/$repo/os/$arch"),
    MirrorEntry::new("CL University of Chile", "https://mirror.uchile.cl/archlinux/$repo/os/$arch"),
    // Africa
    MirrorEntry::new(
        "ZA University of the Witwatersrand",
        "https://archlinux.mirror.ac.za/$repo/os/$arch",
    ),
    // Global CDNs
    MirrorEntry::new("Worldwide CDN", DEFAULT_MIRROR),
    MirrorEntry::new("CloudFlare CDN", "https://cloudflaremirrors.com/archlinux/$repo/os/$arch"),
];
