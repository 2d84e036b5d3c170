use super::features::Matrix;

/// Energy floor applied before taking logarithms.
pub const AMIN: f32 = 1e-10;

/// Default visualization floor in dB below the loudest cell.
pub const DEFAULT_FLOOR_DB: f32 = -80.0;

/// Convert mel energies to decibels relative to the loudest cell.
///
/// Each cell becomes `10·log10(max(x, AMIN)) − 10·log10(ref)` clamped to
/// `floor_db`, where `ref` is the matrix maximum. A matrix whose maximum does
/// not exceed `AMIN` carries no signal and maps entirely to `floor_db`.
pub fn to_db(energy: &Matrix, floor_db: f32) -> Matrix {
    let reference = energy.max().unwrap_or(0.0);
    if reference <= AMIN {
        return Matrix::filled(energy.rows(), energy.cols(), floor_db);
    }

    let ref_db = 10.0 * reference.log10();
    energy.map(|x| {
        let db = 10.0 * x.max(AMIN).log10() - ref_db;
        db.clamp(floor_db, 0.0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_cell_is_zero_db() {
        let energy = Matrix::from_rows(vec![vec![1.0, 10.0], vec![100.0, 0.1]]);
        let db = to_db(&energy, -80.0);
        assert_eq!(db.get(1, 0), 0.0);
        assert!((db.get(0, 1) + 10.0).abs() < 1e-4);
        assert!((db.get(0, 0) + 20.0).abs() < 1e-4);
        assert!((db.get(1, 1) + 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_floor_clamps_quiet_cells() {
        let energy = Matrix::from_rows(vec![vec![1.0, 1e-12, 0.0]]);
        let db = to_db(&energy, -80.0);
        assert_eq!(db.get(0, 1), -80.0);
        assert_eq!(db.get(0, 2), -80.0);
        assert!(db.iter().all(|&v| v <= 0.0 && v >= -80.0));
    }

    #[test]
    fn test_silence_maps_to_floor() {
        let db = to_db(&Matrix::zeros(4, 3), -80.0);
        assert_eq!(db.shape(), (4, 3));
        assert!(db.iter().all(|&v| v == -80.0));

        let db = to_db(&Matrix::filled(2, 2, AMIN * 0.5), -60.0);
        assert!(db.iter().all(|&v| v == -60.0));
    }

    #[test]
    fn test_gain_invariance() {
        let energy = Matrix::from_rows(vec![
            vec![3.0, 0.02, 1e-3],
            vec![0.5, 7.5, 2e-4],
        ]);
        let base = to_db(&energy, -80.0);
        for gain in [1e-3f32, 0.5, 2.0, 1e4] {
            let scaled = to_db(&energy.map(|v| v * gain), -80.0);
            for (a, b) in base.iter().zip(scaled.iter()) {
                assert!((a - b).abs() < 1e-3, "gain {gain}: {a} vs {b}");
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let energy = Matrix::from_rows(vec![vec![0.3, 0.7, 1.9], vec![4.2, 0.0, 1e-6]]);
        assert_eq!(to_db(&energy, -80.0), to_db(&energy, -80.0));
    }
}
