/**
 * THRESHOLD - Seuil de détection ajusté à l'ensoleillement
 *
 * Cloche centrée sur le midi solaire (sun_fraction = 0.5), atténuée jusqu'à
 * 30 % par les nuages, projetée sur [min, max] puis arrondie.
 *
 *   x      = -2 (2s - 1)²
 *   bell   = 5 eˣ / (2 √(2π))        ≤ 0.9974
 *   adj    = bell (1 - 0.3 c)
 *   result = round(adj (max - min) + min)
 *
 * La cloche reste dans ]0, 1[ pour tout s, le résultat est donc toujours
 * compris entre min et max.
 */

use std::f64::consts::{E, PI};

const BELL_SCALE: f64 = 5.0;
const CLOUD_DAMPING: f64 = 0.3;

/// Intensité lumineuse relative en fonction de l'avancement de la journée
pub fn sun_level(sun_fraction: f64) -> f64 {
    let x = -2.0 * (2.0 * sun_fraction - 1.0).powi(2);
    BELL_SCALE * E.powf(x) / (2.0 * (2.0 * PI).sqrt())
}

pub fn threshold(min_t: i64, max_t: i64, sun_fraction: f64, cloud_fraction: f64) -> i64 {
    let cloud = cloud_fraction.clamp(0.0, 1.0);
    let adjusted = sun_level(sun_fraction) * (1.0 - cloud * CLOUD_DAMPING);
    // écart calculé en f64 : max - min déborde en i64 pour des bornes extrêmes
    let span = max_t as f64 - min_t as f64;
    // arrondi au pair le plus proche sur les demi-entiers
    let raw = (adjusted * span + min_t as f64).round_ties_even() as i64;
    let (lo, hi) = if min_t <= max_t { (min_t, max_t) } else { (max_t, min_t) };
    raw.clamp(lo, hi)
}
