fn main() {
    sphere_particles::start();
}
