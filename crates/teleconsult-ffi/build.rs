fn main() {
    uniffi::generate_scaffolding("src/teleconsult.udl").unwrap();
}
