/*!
# Parking DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant les tests du coordinateur de parkings avec:
- Contrôleur de parking simulé (protocole HTTP `GET /`, `POST /book`, `POST /close`)
- Builders de snapshots capteurs au format du contrôleur
*/

pub mod fixtures;
pub mod mock_device;

pub use fixtures::{MockSensor, SnapshotBuilder};
pub use mock_device::{MockCommand, MockDevice};
