//! Starter list of group sites and bulk registration.

use crate::models::{NewSite, RegisterSummary, SiteKind};
use crate::store::{Store, StoreError};
use tracing::{debug, info, instrument, warn};

/// Own sites registered by `seed`, as (name, homepage).
pub const STARTER_SITES: &[(&str, &str)] = &[
    ("Diari de Girona", "https://www.diaridegirona.cat/"),
    ("Diario Córdoba", "https://www.diariocordoba.com/"),
    ("Diario de Ibiza", "https://www.diariodeibiza.es/"),
    ("Información", "https://www.informacion.es/"),
    ("Diario de Mallorca", "https://www.diariodemallorca.es/"),
    ("El Día", "https://www.eldia.es/"),
    ("Empordà", "https://www.emporda.info/"),
    ("El Periódico de Aragón", "https://www.elperiodicodearagon.com/"),
    ("El Periódico Extremadura", "https://www.elperiodicoextremadura.com/"),
    ("El Periódico Mediterráneo", "https://www.elperiodicomediterraneo.com/"),
    ("Faro de Vigo", "https://www.farodevigo.es/"),
    ("La Crónica de Badajoz", "https://www.lacronicabadajoz.com/"),
    ("La Nueva España", "https://www.lne.es/"),
    ("La Opinión A Coruña", "https://www.laopinioncoruna.es/"),
    ("La Opinión de Murcia", "https://www.laopiniondemurcia.es/"),
    ("La Opinión de Málaga", "https://www.laopiniondemalaga.es/"),
    ("La Opinión de Zamora", "https://www.laopiniondezamora.es/"),
    ("La Provincia", "https://www.laprovincia.es/"),
    ("Levante-EMV", "https://www.levante-emv.com/"),
    ("Mallorca Zeitung", "https://www.mallorcazeitung.es/"),
    ("Regió7", "https://www.regio7.cat/"),
    ("Superdeporte", "https://www.superdeporte.es/"),
    ("El Correo Gallego", "https://www.elcorreogallego.es/"),
    ("El Correo Web", "https://www.elcorreoweb.es/"),
    ("EPE", "https://www.epe.es/es/"),
    ("El Periódico", "https://www.elperiodico.com/es/"),
    ("Sport", "https://www.sport.es/es/"),
];

pub fn starter_sites() -> Vec<NewSite> {
    STARTER_SITES
        .iter()
        .map(|(name, url)| NewSite::new(name, url, SiteKind::Own))
        .collect()
}

/// Register the starter list. Safe to run repeatedly.
#[instrument(level = "info", skip_all)]
pub fn seed_sites(store: &Store) -> Result<RegisterSummary, StoreError> {
    register_many(store, &starter_sites())
}

/// Register each site, counting name clashes as `existing`. Entries with a
/// blank name or url are skipped; any other store failure aborts.
pub fn register_many(store: &Store, sites: &[NewSite]) -> Result<RegisterSummary, StoreError> {
    let mut summary = RegisterSummary::default();
    for site in sites {
        match store.add_site(site) {
            Ok(_) => summary.added += 1,
            Err(StoreError::Conflict(_)) => {
                debug!(name = %site.name, "Site already registered");
                summary.existing += 1;
            }
            Err(StoreError::Invalid(reason)) => {
                warn!(name = %site.name, reason, "Skipping incomplete site");
            }
            Err(e) => return Err(e),
        }
    }
    info!(added = summary.added, existing = summary.existing, "Registered sites");
    Ok(summary)
}
