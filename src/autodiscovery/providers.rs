//! Known email provider configurations
//!
//! Exact-match domain table for providers whose endpoints are documented and
//! stable. This is the zero-network fast path of discovery.

use super::ServerConfig;

/// A registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownProvider {
    /// Display name
    pub name: &'static str,
    pub config: ServerConfig,
}

/// Provider hint accepted in requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderHint {
    Gmail,
    Outlook,
    Yahoo,
    /// Generic IMAP, i.e. run discovery
    Imap,
}

impl ProviderHint {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "gmail" | "google" => Some(Self::Gmail),
            "outlook" | "office365" | "microsoft" | "hotmail" => Some(Self::Outlook),
            "yahoo" => Some(Self::Yahoo),
            "imap" | "auto" | "" => Some(Self::Imap),
            _ => None,
        }
    }

    /// Registry entry for a hinted provider, regardless of the address domain
    pub fn provider(&self) -> Option<KnownProvider> {
        match self {
            Self::Gmail => Some(google()),
            Self::Outlook => Some(microsoft_365()),
            Self::Yahoo => Some(yahoo()),
            Self::Imap => None,
        }
    }
}

/// Lowercase identifier for a provider display name: `Microsoft 365` -> `microsoft-365`
pub fn provider_slug(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Look up a domain in the registry. Pure, no I/O.
pub fn lookup(domain: &str) -> Option<KnownProvider> {
    let domain_lower = domain.trim().trim_end_matches('.').to_lowercase();

    let provider = match domain_lower.as_str() {
        // Gmail / Google
        "gmail.com" | "googlemail.com" | "google.com" => google(),

        // Microsoft consumer domains
        "outlook.com" | "hotmail.com" | "live.com" | "msn.com" | "hotmail.co.uk"
        | "hotmail.fr" | "hotmail.de" | "hotmail.it" | "hotmail.es" | "live.fr"
        | "live.co.uk" | "outlook.fr" | "outlook.de" | "outlook.co.uk" => microsoft_consumer(),

        // Yahoo domains
        "yahoo.com" | "yahoo.co.uk" | "yahoo.fr" | "yahoo.de" | "yahoo.es" | "yahoo.it"
        | "yahoo.ca" | "yahoo.com.au" | "ymail.com" | "rocketmail.com" => yahoo(),

        // AOL (Yahoo infrastructure)
        "aol.com" | "aol.fr" => KnownProvider {
            name: "AOL Mail",
            config: ServerConfig::standard("imap.aol.com", "smtp.aol.com").with_smtps(),
        },

        // iCloud
        "icloud.com" | "me.com" | "mac.com" => KnownProvider {
            name: "iCloud",
            config: ServerConfig::standard("imap.mail.me.com", "smtp.mail.me.com"),
        },

        // Fastmail
        "fastmail.com" | "fastmail.fm" | "messagingengine.com" => KnownProvider {
            name: "Fastmail",
            config: ServerConfig::standard("imap.fastmail.com", "smtp.fastmail.com").with_smtps(),
        },

        // GMX / mail.com
        "gmx.com" | "gmx.net" | "gmx.de" | "gmx.at" | "gmx.ch" | "gmx.fr" => KnownProvider {
            name: "GMX",
            config: ServerConfig::standard("imap.gmx.com", "mail.gmx.com"),
        },
        "mail.com" => KnownProvider {
            name: "mail.com",
            config: ServerConfig::standard("imap.mail.com", "smtp.mail.com"),
        },

        // Zoho
        "zoho.com" | "zohomail.com" => zoho(),

        // Yandex
        "yandex.com" | "yandex.ru" | "ya.ru" => yandex(),

        // French ISPs
        "orange.fr" | "wanadoo.fr" => KnownProvider {
            name: "Orange",
            config: ServerConfig::standard("imap.orange.fr", "smtp.orange.fr").with_smtps(),
        },
        "free.fr" => KnownProvider {
            name: "Free",
            config: ServerConfig::standard("imap.free.fr", "smtp.free.fr").with_smtps(),
        },
        "sfr.fr" | "neuf.fr" => KnownProvider {
            name: "SFR",
            config: ServerConfig::standard("imap.sfr.fr", "smtp.sfr.fr").with_smtps(),
        },
        "laposte.net" => KnownProvider {
            name: "La Poste",
            config: ServerConfig::standard("imap.laposte.net", "smtp.laposte.net").with_smtps(),
        },
        "bbox.fr" => KnownProvider {
            name: "Bouygues Telecom",
            config: ServerConfig::standard("imap4.bbox.fr", "smtp.bbox.fr"),
        },

        // German ISPs
        "web.de" => KnownProvider {
            name: "WEB.DE",
            config: ServerConfig::standard("imap.web.de", "smtp.web.de"),
        },
        "t-online.de" => KnownProvider {
            name: "T-Online",
            config: ServerConfig::standard("secureimap.t-online.de", "securesmtp.t-online.de")
                .with_smtps(),
        },

        _ => return None,
    };

    Some(provider)
}

// ============================================================================
// Provider-specific configurations shared with MX analysis
// ============================================================================

/// Google / Gmail
pub fn google() -> KnownProvider {
    KnownProvider {
        name: "Gmail",
        config: ServerConfig::standard("imap.gmail.com", "smtp.gmail.com"),
    }
}

/// Microsoft 365 / Office 365 (custom domains)
pub fn microsoft_365() -> KnownProvider {
    KnownProvider {
        name: "Microsoft 365",
        config: ServerConfig::standard("outlook.office365.com", "smtp.office365.com"),
    }
}

/// Outlook.com, Hotmail, Live
fn microsoft_consumer() -> KnownProvider {
    KnownProvider {
        name: "Outlook.com",
        config: ServerConfig::standard("outlook.office365.com", "smtp-mail.outlook.com"),
    }
}

/// Yahoo Mail
pub fn yahoo() -> KnownProvider {
    KnownProvider {
        name: "Yahoo Mail",
        config: ServerConfig::standard("imap.mail.yahoo.com", "smtp.mail.yahoo.com").with_smtps(),
    }
}

/// Zoho Mail
pub fn zoho() -> KnownProvider {
    KnownProvider {
        name: "Zoho Mail",
        config: ServerConfig::standard("imap.zoho.com", "smtp.zoho.com").with_smtps(),
    }
}

/// Yandex Mail
pub fn yandex() -> KnownProvider {
    KnownProvider {
        name: "Yandex",
        config: ServerConfig::standard("imap.yandex.com", "smtp.yandex.com").with_smtps(),
    }
}
