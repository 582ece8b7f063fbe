//! Namensaehnlichkeit fuer den Roster-Abgleich
//!
//! Spiel- und Voice-Roster teilen keinen Schluessel; wo keine IP zur
//! Verfuegung steht, entscheidet die Aehnlichkeit der Namen. Der Wert ist
//! die normalisierte Levenshtein-Distanz, skaliert auf den bestmoeglichen
//! Wert: ein kurzer Name der vollstaendig in einem laengeren enthalten ist
//! erreicht so 100.
//!
//! Beispiel: `bob` gegen `b0bwuzhere` – Distanz 8 bei Laenge 10 ergibt
//! (10-8)/10 = 20%, bestmoeglich waere 3/10 = 30%, relativ also 66,6%.

/// Levenshtein-Distanz (Einfuegen/Loeschen/Ersetzen, Kosten je 1)
pub fn levenshtein_distanz(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Zwei-Zeilen-Variante der Standard-DP-Matrix
    let mut vorherige: Vec<usize> = (0..=b.len()).collect();
    let mut aktuelle = vec![0usize; b.len() + 1];

    for (i, za) in a.iter().enumerate() {
        aktuelle[0] = i + 1;
        for (j, zb) in b.iter().enumerate() {
            let ersetzen = vorherige[j] + usize::from(za != zb);
            let loeschen = vorherige[j + 1] + 1;
            let einfuegen = aktuelle[j] + 1;
            aktuelle[j + 1] = ersetzen.min(loeschen).min(einfuegen);
        }
        std::mem::swap(&mut vorherige, &mut aktuelle);
    }
    vorherige[b.len()]
}

/// Prozentuale Uebereinstimmung zweier Namen (0.0 - 100.0)
///
/// Beide Eingaben werden vor dem Vergleich kleingeschrieben.
pub fn prozent_uebereinstimmung(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let laenge_a = a.chars().count();
    let laenge_b = b.chars().count();
    let max = laenge_a.max(laenge_b) as f64;
    let min = laenge_a.min(laenge_b) as f64;

    if max == 0.0 {
        // Zwei leere Namen sind identisch
        return 100.0;
    }
    if min == 0.0 {
        return 0.0;
    }

    let distanz = levenshtein_distanz(&a, &b) as f64;
    let anteil = (max - distanz) / max;
    let bestmoeglich = min / max;
    (anteil / bestmoeglich) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distanz_null_genau_bei_gleichheit() {
        assert_eq!(levenshtein_distanz("kanal", "kanal"), 0);
        assert_ne!(levenshtein_distanz("kanal", "kanaele"), 0);
    }

    #[test]
    fn distanz_ist_symmetrisch() {
        let paare = [("bob", "b0bwuzhere"), ("abc", "xyz"), ("", "hallo"), ("kurz", "laenger")];
        for (a, b) in paare {
            assert_eq!(
                levenshtein_distanz(a, b),
                levenshtein_distanz(b, a),
                "{a:?} vs {b:?}"
            );
        }
    }

    #[test]
    fn distanz_bekannter_werte() {
        assert_eq!(levenshtein_distanz("", ""), 0);
        assert_eq!(levenshtein_distanz("", "abc"), 3);
        assert_eq!(levenshtein_distanz("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distanz("bob", "b0bwuzhere"), 8);
    }

    #[test]
    fn dokumentiertes_beispiel() {
        // Das Rechenbeispiel aus der Modulbeschreibung
        let wert = prozent_uebereinstimmung("bob", "b0bwuzhere");
        assert!((wert - 66.6).abs() < 0.1, "erwartet ~66.6, war {wert}");
    }

    #[test]
    fn enthaltener_teilname_erreicht_hundert() {
        assert!((prozent_uebereinstimmung("bob", "bobcat") - 100.0).abs() < 1e-9);
    }

    #[test]
    fn gross_kleinschreibung_ist_egal() {
        assert!((prozent_uebereinstimmung("Hans", "hans") - 100.0).abs() < 1e-9);
    }

    #[test]
    fn leere_namen() {
        assert_eq!(prozent_uebereinstimmung("", ""), 100.0);
        assert_eq!(prozent_uebereinstimmung("", "name"), 0.0);
    }

    #[test]
    fn identische_namen_erreichen_hundert() {
        assert!((prozent_uebereinstimmung("spieler_eins", "spieler_eins") - 100.0).abs() < 1e-9);
    }
}
