use crate::model::PdbSnapshot;

/// PDBs that currently allow zero disruptions, in input order.
pub fn blocking(pdbs: &[PdbSnapshot]) -> Vec<PdbSnapshot> {
    pdbs.iter().filter(|p| p.is_blocking()).cloned().collect()
}
